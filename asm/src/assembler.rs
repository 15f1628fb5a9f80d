//! The two-pass assembler.
//!
//! Pass 1 tokenizes lines, binds labels, consumes `.equ`, and records IR
//! items with final word addresses. After the `.equ` fixed point, pass 2
//! evaluates expressions, expands pseudo-instructions, and encodes each item
//! through the spec table.

use crate::error::{AsmError, AsmErrorKind, AtLine, Result};
use crate::expr::{parse_uint, resolve_expr};
use crate::include;
use crate::ir::{DirectiveKind, Item, JumpKind, LineInfo, MathShape, PseudoOp};
use crate::line::{is_ident, parse_directive, split_label, strip_comment};
use crate::macros::MacroTable;
use amber::builtins::BUILTIN_SYMBOLS;
use amber::constants::WORD_MASK;
use amber::spec::{InstructionSet, InstructionSpec};
use amber::Word;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::mem;
use std::path::Path;
use tracing::debug;

/// Rewrites addressing-mode sugar into the canonical operand token list.
struct OperandRewriter {
    pc_plus_dr: Regex,
    expr_paren_ar: Regex,
    expr_paren_sr: Regex,
    ar_plus_expr: Regex,
    sr_plus_expr: Regex,
    dr: Regex,
}

impl OperandRewriter {
    fn new() -> OperandRewriter {
        OperandRewriter {
            pc_plus_dr: Regex::new(r"(?i)^PC\s*\+\s*(DR\d+)$").unwrap(),
            expr_paren_ar: Regex::new(r"(?i)^\s*(.*?)\s*\(\s*(AR\d)\s*\)\s*$").unwrap(),
            expr_paren_sr: Regex::new(r"(?i)^\s*(.*?)\s*\(\s*(SR\d|PC|LR|SSP|FL)\s*\)\s*$").unwrap(),
            ar_plus_expr: Regex::new(r"(?i)^(AR\d)\s*\+\s*(.+)$").unwrap(),
            sr_plus_expr: Regex::new(r"(?i)^(SR\d|PC|LR|SSP|FL)\s*\+\s*(.+)$").unwrap(),
            dr: Regex::new(r"(?i)^DR\d+$").unwrap(),
        }
    }

    fn rewrite(&self, token: &str, out: &mut Vec<String>) {
        // 'PC + DRx' => DRx (register-relative branches); checked first so
        // the SR rule below cannot swallow it.
        if let Some(caps) = self.pc_plus_dr.captures(token) {
            out.push(caps[1].to_ascii_uppercase());
            return;
        }
        // 'expr(ARx)' => expr, ARx
        if let Some(caps) = self.expr_paren_ar.captures(token) {
            if !caps[1].trim().is_empty() {
                out.push(caps[1].trim().to_string());
                out.push(caps[2].to_ascii_uppercase());
                return;
            }
        }
        // 'expr(SRx)' => expr, SRx
        if let Some(caps) = self.expr_paren_sr.captures(token) {
            if !caps[1].trim().is_empty() {
                out.push(caps[1].trim().to_string());
                out.push(caps[2].to_ascii_uppercase());
                return;
            }
        }
        // 'ARx + expr' => ARx, expr
        if let Some(caps) = self.ar_plus_expr.captures(token) {
            out.push(caps[1].to_ascii_uppercase());
            out.push(caps[2].trim().to_string());
            return;
        }
        // 'SRx + expr' => SRx, expr
        if let Some(caps) = self.sr_plus_expr.captures(token) {
            out.push(caps[1].to_ascii_uppercase());
            out.push(caps[2].trim().to_string());
            return;
        }
        out.push(token.to_string());
    }
}

struct PendingEqu {
    name: String,
    expr: String,
    line_no: usize,
    src: String,
}

/// One assembly unit. All mutable state lives here and is reset at the
/// start of every `assemble` call, so an instance can be reused.
pub struct Assembler {
    origin: u32,
    specs: InstructionSet,
    rewriter: OperandRewriter,
    symbols: HashMap<String, i64>,
    ir: Vec<Item>,
    pending_equ: Vec<PendingEqu>,
}

impl Assembler {
    pub fn new(origin: u32) -> Assembler {
        Assembler {
            origin,
            specs: InstructionSet::new(),
            rewriter: OperandRewriter::new(),
            symbols: HashMap::new(),
            ir: Vec::new(),
            pending_equ: Vec::new(),
        }
    }

    pub fn origin(&self) -> u32 {
        self.origin
    }

    /// Symbol table of the most recent assembly (labels, `.equ`s, builtins).
    pub fn symbols(&self) -> &HashMap<String, i64> {
        &self.symbols
    }

    /// Assemble a source string. Includes resolve relative to the current
    /// working directory.
    pub fn assemble(&mut self, source: &str) -> Result<Vec<Word>> {
        self.reset();
        let mut base_stack = vec![std::env::current_dir().unwrap_or_default()];
        let preprocessed = include::expand_includes(source, &mut base_stack, 0)?;
        self.assemble_preprocessed(&preprocessed)
    }

    /// Assemble a file. Includes resolve relative to the including file's
    /// directory first.
    pub fn assemble_path(&mut self, path: &Path) -> Result<Vec<Word>> {
        self.reset();
        let text = fs::read_to_string(path).map_err(|err| {
            AsmError::new(
                AsmErrorKind::SourceRead {
                    path: path.to_path_buf(),
                    source: err,
                },
                0,
                "",
            )
        })?;
        let mut base_stack = vec![path.parent().map(Path::to_path_buf).unwrap_or_default()];
        let preprocessed = include::expand_includes(&text, &mut base_stack, 0)?;
        self.assemble_preprocessed(&preprocessed)
    }

    fn reset(&mut self) {
        self.symbols.clear();
        for (name, value) in BUILTIN_SYMBOLS {
            self.symbols.insert((*name).to_string(), *value as i64);
        }
        self.ir.clear();
        self.pending_equ.clear();
    }

    fn assemble_preprocessed(&mut self, source: &str) -> Result<Vec<Word>> {
        let (mut macros, kept) = MacroTable::collect(source)?;
        let expanded = macros.expand_all(kept)?;
        debug!(lines = expanded.len(), "preprocessing complete");
        let expanded = expanded.join("\n");

        self.pass1(&expanded)?;
        debug!(
            items = self.ir.len(),
            symbols = self.symbols.len(),
            "pass 1 complete"
        );
        self.resolve_pending_equ()?;
        let words = self.pass2()?;
        debug!(words = words.len(), "pass 2 complete");
        Ok(words)
    }

    // ---- Pass 1 -----------------------------------------------------------

    fn pass1(&mut self, source: &str) -> Result<()> {
        let mut pc = self.origin;
        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw);
            if line.is_empty() {
                continue;
            }

            let (label, line) = split_label(line);
            if let Some(label) = label {
                if self.symbols.contains_key(label) {
                    return Err(AsmError::new(
                        AsmErrorKind::DuplicateLabel(label.to_string()),
                        line_no,
                        raw,
                    ));
                }
                self.symbols.insert(label.to_string(), pc as i64);
            }
            if line.is_empty() {
                continue;
            }

            if line.starts_with('.') {
                self.pass1_directive(line, raw, line_no, &mut pc)?;
                continue;
            }

            let (mnemonic, operands) = self.parse_instruction(line);
            let info = LineInfo {
                addr: pc,
                src: raw.to_string(),
                line_no,
            };
            if let Some(op) = PseudoOp::from_mnemonic(&mnemonic) {
                pc += op.expansion_len();
                self.ir.push(Item::Pseudo { info, op, operands });
            } else {
                pc += 1;
                self.ir.push(Item::Instruction {
                    info,
                    mnemonic,
                    operands,
                });
            }
        }
        Ok(())
    }

    fn pass1_directive(
        &mut self,
        line: &str,
        raw: &str,
        line_no: usize,
        pc: &mut u32,
    ) -> Result<()> {
        let (name, args) = parse_directive(line);
        match name.as_str() {
            "org" => {
                // Origin takes a numeric literal; expressions belong in .equ.
                let arg = args
                    .first()
                    .ok_or(AsmErrorKind::OrgMissingAddress)
                    .at_line(line_no, raw)?;
                let target: u32 = parse_uint(arg)
                    .ok_or_else(|| AsmErrorKind::MalformedNumber(arg.clone()))
                    .at_line(line_no, raw)?;
                *pc = target;
                self.ir.push(Item::Directive {
                    info: LineInfo {
                        addr: *pc,
                        src: raw.to_string(),
                        line_no,
                    },
                    kind: DirectiveKind::Org,
                    args,
                });
            }
            "equ" => {
                if args.len() != 2 {
                    return Err(AsmError::new(AsmErrorKind::EquArgCount, line_no, raw));
                }
                let (sym, expr) = (args[0].clone(), args[1].clone());
                if !is_ident(&sym) {
                    return Err(AsmError::new(
                        AsmErrorKind::EquInvalidName(sym),
                        line_no,
                        raw,
                    ));
                }
                if self.symbols.contains_key(&sym)
                    || self.pending_equ.iter().any(|p| p.name == sym)
                {
                    return Err(AsmError::new(AsmErrorKind::DuplicateEqu(sym), line_no, raw));
                }
                match resolve_expr(&expr, &self.symbols, 48, false, *pc, false) {
                    Ok(value) => {
                        self.symbols.insert(sym, value as i64);
                    }
                    // Forward reference: settle it in the fixed point.
                    Err(AsmErrorKind::UnknownSymbol(_)) => self.pending_equ.push(PendingEqu {
                        name: sym,
                        expr,
                        line_no,
                        src: raw.to_string(),
                    }),
                    Err(kind) => return Err(AsmError::new(kind, line_no, raw)),
                }
            }
            "dw24" | "diad" => {
                self.ir.push(Item::Directive {
                    info: LineInfo {
                        addr: *pc,
                        src: raw.to_string(),
                        line_no,
                    },
                    kind: DirectiveKind::Dw24,
                    args: args.clone(),
                });
                *pc += args.len() as u32;
            }
            "align" => {
                let arg = args
                    .first()
                    .ok_or(AsmErrorKind::AlignNonPositive)
                    .at_line(line_no, raw)?;
                if arg.starts_with('-') {
                    return Err(AsmError::new(AsmErrorKind::AlignNonPositive, line_no, raw));
                }
                let n: u32 = parse_uint(arg)
                    .ok_or_else(|| AsmErrorKind::MalformedNumber(arg.clone()))
                    .at_line(line_no, raw)?;
                if n == 0 {
                    return Err(AsmError::new(AsmErrorKind::AlignNonPositive, line_no, raw));
                }
                let rem = *pc % n;
                if rem != 0 {
                    *pc += n - rem;
                }
                // Lowered to an .org at the aligned address.
                self.ir.push(Item::Directive {
                    info: LineInfo {
                        addr: *pc,
                        src: raw.to_string(),
                        line_no,
                    },
                    kind: DirectiveKind::Org,
                    args: Vec::new(),
                });
            }
            other => {
                return Err(AsmError::new(
                    AsmErrorKind::UnknownDirective(other.to_string()),
                    line_no,
                    raw,
                ));
            }
        }
        Ok(())
    }

    fn parse_instruction(&self, line: &str) -> (String, Vec<String>) {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim()),
            None => (line, ""),
        };
        let mnemonic = mnemonic.to_ascii_uppercase();

        let mut ops: Vec<String> = Vec::new();
        if !rest.is_empty() {
            for token in rest.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                self.rewriter.rewrite(token, &mut ops);
            }
        }

        // Friendly CSR syntax: reorder if the data register is on the wrong
        // side of CSRWR/CSRRD.
        if mnemonic == "CSRWR"
            && ops.len() == 2
            && self.rewriter.dr.is_match(&ops[1])
            && !self.rewriter.dr.is_match(&ops[0])
        {
            ops.swap(0, 1);
            ops[0] = ops[0].to_ascii_uppercase();
        }
        if mnemonic == "CSRRD"
            && ops.len() == 2
            && self.rewriter.dr.is_match(&ops[0])
            && !self.rewriter.dr.is_match(&ops[1])
        {
            ops.swap(0, 1);
            ops[1] = ops[1].to_ascii_uppercase();
        }

        (mnemonic, ops)
    }

    // ---- .equ fixed point -------------------------------------------------

    fn resolve_pending_equ(&mut self) -> Result<()> {
        if self.pending_equ.is_empty() {
            return Ok(());
        }
        let mut pending = mem::take(&mut self.pending_equ);
        // n passes over n entries suffice: each successful pass strictly
        // shrinks the pending set.
        for _ in 0..pending.len() {
            if pending.is_empty() {
                break;
            }
            let before = pending.len();
            let mut still_pending = Vec::new();
            for entry in pending {
                match resolve_expr(&entry.expr, &self.symbols, 48, false, self.origin, false) {
                    Ok(value) => {
                        self.symbols.insert(entry.name, value as i64);
                    }
                    Err(AsmErrorKind::UnknownSymbol(_)) => still_pending.push(entry),
                    Err(kind) => return Err(AsmError::new(kind, entry.line_no, &entry.src)),
                }
            }
            pending = still_pending;
            if pending.len() == before {
                break;
            }
        }
        if !pending.is_empty() {
            let listing = pending
                .iter()
                .map(|p| format!("{} (line {})", p.name, p.line_no))
                .collect::<Vec<_>>()
                .join(", ");
            let first = &pending[0];
            return Err(AsmError::new(
                AsmErrorKind::UnresolvedEqu(listing),
                first.line_no,
                &first.src,
            ));
        }
        debug!(".equ fixed point complete");
        Ok(())
    }

    // ---- Pass 2 -----------------------------------------------------------

    fn pass2(&mut self) -> Result<Vec<Word>> {
        let ir = mem::take(&mut self.ir);
        let mut words: Vec<Word> = Vec::new();

        for item in &ir {
            match item {
                Item::Directive { info, kind, args } => match kind {
                    DirectiveKind::Org => {
                        // Zero-pad forward gaps; a backwards .org emits nothing.
                        let target = info.addr as i64 - self.origin as i64;
                        let gap = target - words.len() as i64;
                        if gap > 0 {
                            words.resize(words.len() + gap as usize, 0);
                        }
                    }
                    DirectiveKind::Dw24 => {
                        for arg in args {
                            let pc = words.len() as u32 + self.origin;
                            let value = resolve_expr(arg, &self.symbols, 24, false, pc, false)
                                .at_line(info.line_no, &info.src)?;
                            words.push(value as u32 & WORD_MASK);
                        }
                    }
                },
                Item::Instruction {
                    info,
                    mnemonic,
                    operands,
                } => {
                    let spec = self
                        .specs
                        .get(mnemonic)
                        .ok_or_else(|| AsmErrorKind::UnknownMnemonic(mnemonic.clone()))
                        .at_line(info.line_no, &info.src)?;
                    let ops: Vec<&str> = operands.iter().map(String::as_str).collect();
                    let word = self
                        .encode_at(spec, &ops, info.addr)
                        .at_line(info.line_no, &info.src)?;
                    words.push(word);
                }
                Item::Pseudo { info, op, operands } => {
                    let before = words.len();
                    self.expand_pseudo(*op, operands, info.addr, &mut words)
                        .at_line(info.line_no, &info.src)?;
                    // Pass 1 already accounted for exactly this many words.
                    debug_assert_eq!(words.len() - before, op.expansion_len() as usize);
                }
            }
        }
        Ok(words)
    }

    fn encode_at(
        &self,
        spec: &InstructionSpec,
        ops: &[&str],
        pc: u32,
    ) -> std::result::Result<Word, AsmErrorKind> {
        let symbols = &self.symbols;
        spec.encode(ops, |token, width, signed, pc_relative| {
            resolve_expr(token, symbols, width, signed, pc, pc_relative).map(|v| v as u32)
        })
    }

    fn expand_pseudo(
        &self,
        op: PseudoOp,
        operands: &[String],
        addr: u32,
        words: &mut Vec<Word>,
    ) -> std::result::Result<(), AsmErrorKind> {
        let ops: Vec<&str> = operands.iter().map(String::as_str).collect();
        if ops.len() != expected_operands(op) {
            return Err(AsmErrorKind::PseudoOperandCount {
                pseudo: op.name(),
                expected: expected_operands(op),
                got: ops.len(),
            });
        }

        let mut emitter = PseudoEmitter {
            asm: self,
            words,
            pc: addr,
        };

        match op {
            PseudoOp::Jump(kind) => {
                let target = ops[ops.len() - 1];
                let imm48 = resolve_expr(target, &self.symbols, 48, false, addr, false)?;
                // Preload latch banks 2, 1, 0 with imm48[47:36], [35:24],
                // [23:12]; the final instruction consumes [11:0].
                for (bank, shift) in [(2u32, 36u32), (1, 24), (0, 12)] {
                    let bank = bank.to_string();
                    let payload = format!("#{}", (imm48 >> shift) & 0xFFF);
                    emitter.emit("LUIUI", &[bank.as_str(), payload.as_str()])?;
                }
                let low = format!("#{}", imm48 & 0xFFF);
                match kind {
                    JumpKind::Jcc => emitter.emit("JCCUI", &[ops[0], low.as_str()])?,
                    JumpKind::Jsr => emitter.emit("JSRUI", &[low.as_str()])?,
                    JumpKind::Swi => emitter.emit("SYSCALL", &[low.as_str()])?,
                }
            }
            PseudoOp::Math(def) => {
                let tmp = ops[ops.len() - 1];
                emitter.emit("CSRWR", &[ops[0], "#MATH_OPA"])?;
                match def.shape {
                    MathShape::MulDiv | MathShape::Binary => {
                        emitter.emit("CSRWR", &[ops[1], "#MATH_OPB"])?;
                    }
                    MathShape::Clamp => {
                        emitter.emit("CSRWR", &[ops[2], "#MATH_OPB"])?; // max
                        emitter.emit("CSRWR", &[ops[1], "#MATH_OPC"])?; // min
                    }
                    MathShape::Unary => {}
                }
                let control = format!("#MATH_CTRL_START + {}", def.op_symbol);
                emitter.emit("MOVUI", &[control.as_str(), tmp])?;
                emitter.emit("CSRWR", &[tmp, "#MATH_CTRL"])?;
                // Poll until READY.
                emitter.emit("CSRRD", &["#MATH_STATUS", tmp])?;
                emitter.emit("ANDUI", &["#MATH_STATUS_READY", tmp])?;
                emitter.emit("BCCSO", &["EQ", ".-2"])?;
                match def.shape {
                    MathShape::MulDiv => {
                        emitter.emit("CSRRD", &["#MATH_RES0", ops[2]])?;
                        emitter.emit("CSRRD", &["#MATH_RES1", ops[3]])?;
                    }
                    MathShape::Binary => emitter.emit("CSRRD", &["#MATH_RES0", ops[2]])?,
                    MathShape::Unary => emitter.emit("CSRRD", &["#MATH_RES0", ops[1]])?,
                    MathShape::Clamp => emitter.emit("CSRRD", &["#MATH_RES0", ops[3]])?,
                }
            }
            PseudoOp::PackDiad => {
                let (hi, lo, dst, tmp) = (ops[0], ops[1], ops[2], ops[3]);
                emitter.emit("MOVUR", &[hi, dst])?;
                emitter.emit("ANDUI", &["#0xFFF", dst])?;
                emitter.emit("SHLUI", &["#12", dst])?;
                emitter.emit("MOVUR", &[lo, tmp])?;
                emitter.emit("ANDUI", &["#0xFFF", tmp])?;
                emitter.emit("ORUR", &[tmp, dst])?;
            }
            PseudoOp::UnpackDiad => {
                let (src, hi, lo) = (ops[0], ops[1], ops[2]);
                emitter.emit("MOVUR", &[src, lo])?;
                emitter.emit("ANDUI", &["#0xFFF", lo])?;
                emitter.emit("MOVUR", &[src, hi])?;
                emitter.emit("SHRUI", &["#12", hi])?;
                emitter.emit("ANDUI", &["#0xFFF", hi])?;
            }
            PseudoOp::DiadMovui => {
                let (dst, imm_hi, imm_lo) = (ops[0], ops[1], ops[2]);
                emitter.emit("MOVUI", &[imm_hi, dst])?;
                emitter.emit("SHLUI", &["#12", dst])?;
                emitter.emit("ORUI", &[imm_lo, dst])?;
            }
        }
        Ok(())
    }
}

fn expected_operands(op: PseudoOp) -> usize {
    match op {
        PseudoOp::Jump(kind) => kind.operand_count(),
        PseudoOp::Math(def) => def.shape.operand_count(),
        PseudoOp::PackDiad => 4,
        PseudoOp::UnpackDiad => 3,
        PseudoOp::DiadMovui => 3,
    }
}

/// Emits spec-backed words for a pseudo expansion, advancing the PC so
/// PC-relative immediates inside the expansion (the ready-poll branch)
/// resolve against the word actually being emitted.
struct PseudoEmitter<'a> {
    asm: &'a Assembler,
    words: &'a mut Vec<Word>,
    pc: u32,
}

impl PseudoEmitter<'_> {
    fn emit(
        &mut self,
        mnemonic: &'static str,
        ops: &[&str],
    ) -> std::result::Result<(), AsmErrorKind> {
        let spec = self
            .asm
            .specs
            .get(mnemonic)
            .ok_or(AsmErrorKind::MissingSpec(mnemonic))?;
        let word = self.asm.encode_at(spec, ops, self.pc)?;
        self.words.push(word);
        self.pc += 1;
        Ok(())
    }
}

/// Assemble a source string with origin 0.
pub fn assemble(source: &str) -> Result<Vec<Word>> {
    Assembler::new(0).assemble(source)
}

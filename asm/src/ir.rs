//! Pass-1 intermediate representation.
//!
//! Pass 1 assigns every item its final word address; pseudo-instructions
//! carry statically known expansion lengths, so pass 2 never grows or
//! shrinks an item.

/// Source position shared by all IR items.
#[derive(Debug, Clone)]
pub(crate) struct LineInfo {
    /// Word address assigned in pass 1.
    pub addr: u32,
    /// Original source line (from the preprocessed stream).
    pub src: String,
    /// 1-based line number in the preprocessed stream.
    pub line_no: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirectiveKind {
    /// `.org` (also the lowered form of `.align`). Pass 2 zero-pads any gap.
    Org,
    /// `.dw24` / `.diad`: one evaluated word per argument.
    Dw24,
}

#[derive(Debug, Clone)]
pub(crate) enum Item {
    Instruction {
        info: LineInfo,
        mnemonic: String,
        operands: Vec<String>,
    },
    Directive {
        info: LineInfo,
        kind: DirectiveKind,
        args: Vec<String>,
    },
    Pseudo {
        info: LineInfo,
        op: PseudoOp,
        operands: Vec<String>,
    },
}

/// Absolute control transfers expanded to three `LUIui` bank loads plus the
/// concrete control instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JumpKind {
    Jcc,
    Jsr,
    Swi,
}

impl JumpKind {
    pub fn name(self) -> &'static str {
        match self {
            JumpKind::Jcc => "JCCUI",
            JumpKind::Jsr => "JSRUI",
            JumpKind::Swi => "SWIUI",
        }
    }

    pub fn operand_count(self) -> usize {
        match self {
            JumpKind::Jcc => 2, // CC, target
            JumpKind::Jsr | JumpKind::Swi => 1,
        }
    }
}

/// Operand layout of an async-math pseudo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MathShape {
    /// `a, b, d_lo, d_hi, tmp` — two results (mul/div).
    MulDiv,
    /// `a, b, d, tmp`.
    Binary,
    /// `a, d, tmp`.
    Unary,
    /// `a, d_min, d_max, d_res, tmp`.
    Clamp,
}

impl MathShape {
    pub fn operand_count(self) -> usize {
        match self {
            MathShape::MulDiv | MathShape::Clamp => 5,
            MathShape::Binary => 4,
            MathShape::Unary => 3,
        }
    }

    pub fn needs_opb(self) -> bool {
        !matches!(self, MathShape::Unary)
    }

    pub fn needs_opc(self) -> bool {
        matches!(self, MathShape::Clamp)
    }

    pub fn two_results(self) -> bool {
        matches!(self, MathShape::MulDiv)
    }

    /// Words produced by the expansion: operand CSR writes, control load and
    /// kick, the three-word ready poll, and the result read(s).
    pub fn expansion_len(self) -> u32 {
        let mut words = 1; // OPA write
        if self.needs_opb() {
            words += 1;
        }
        if self.needs_opc() {
            words += 1;
        }
        words += 2; // MOVUI ctrl, CSRWR ctrl
        words += 3; // CSRRD status / ANDUI ready / BCCSO back
        words += 1; // RES0
        if self.two_results() {
            words += 1; // RES1
        }
        words
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MathOpDef {
    pub mnemonic: &'static str,
    pub shape: MathShape,
    /// Built-in symbol holding the pre-shifted OP field value.
    pub op_symbol: &'static str,
}

pub(crate) const MATH_OPS: &[MathOpDef] = &[
    // Two-result mul/div
    MathOpDef { mnemonic: "MULU24", shape: MathShape::MulDiv, op_symbol: "MATH_OP_MULU" },
    MathOpDef { mnemonic: "MULS24", shape: MathShape::MulDiv, op_symbol: "MATH_OP_MULS" },
    MathOpDef { mnemonic: "DIVU24", shape: MathShape::MulDiv, op_symbol: "MATH_OP_DIVU" },
    MathOpDef { mnemonic: "DIVS24", shape: MathShape::MulDiv, op_symbol: "MATH_OP_DIVS" },
    MathOpDef { mnemonic: "DIV12", shape: MathShape::MulDiv, op_symbol: "MATH_OP_DIV12" },
    // Two-operand, one result
    MathOpDef { mnemonic: "MODU24", shape: MathShape::Binary, op_symbol: "MATH_OP_MODU" },
    MathOpDef { mnemonic: "MODS24", shape: MathShape::Binary, op_symbol: "MATH_OP_MODS" },
    MathOpDef { mnemonic: "MIN_U24", shape: MathShape::Binary, op_symbol: "MATH_OP_MIN_U" },
    MathOpDef { mnemonic: "MAX_U24", shape: MathShape::Binary, op_symbol: "MATH_OP_MAX_U" },
    MathOpDef { mnemonic: "MIN_S24", shape: MathShape::Binary, op_symbol: "MATH_OP_MIN_S" },
    MathOpDef { mnemonic: "MAX_S24", shape: MathShape::Binary, op_symbol: "MATH_OP_MAX_S" },
    MathOpDef { mnemonic: "ADD24", shape: MathShape::Binary, op_symbol: "MATH_OP_ADD24" },
    MathOpDef { mnemonic: "SUB24", shape: MathShape::Binary, op_symbol: "MATH_OP_SUB24" },
    MathOpDef { mnemonic: "ADD12", shape: MathShape::Binary, op_symbol: "MATH_OP_ADD12" },
    MathOpDef { mnemonic: "SUB12", shape: MathShape::Binary, op_symbol: "MATH_OP_SUB12" },
    MathOpDef { mnemonic: "MUL12", shape: MathShape::Binary, op_symbol: "MATH_OP_MUL12" },
    MathOpDef { mnemonic: "MOD12", shape: MathShape::Binary, op_symbol: "MATH_OP_MOD12" },
    MathOpDef { mnemonic: "MIN12_U", shape: MathShape::Binary, op_symbol: "MATH_OP_MIN12_U" },
    MathOpDef { mnemonic: "MAX12_U", shape: MathShape::Binary, op_symbol: "MATH_OP_MAX12_U" },
    MathOpDef { mnemonic: "MIN12_S", shape: MathShape::Binary, op_symbol: "MATH_OP_MIN12_S" },
    MathOpDef { mnemonic: "MAX12_S", shape: MathShape::Binary, op_symbol: "MATH_OP_MAX12_S" },
    // One-operand, one result
    MathOpDef { mnemonic: "SQRTU24", shape: MathShape::Unary, op_symbol: "MATH_OP_SQRTU" },
    MathOpDef { mnemonic: "ABS_S24", shape: MathShape::Unary, op_symbol: "MATH_OP_ABS_S" },
    MathOpDef { mnemonic: "NEG24", shape: MathShape::Unary, op_symbol: "MATH_OP_NEG24" },
    MathOpDef { mnemonic: "NEG12", shape: MathShape::Unary, op_symbol: "MATH_OP_NEG12" },
    MathOpDef { mnemonic: "SQRT12", shape: MathShape::Unary, op_symbol: "MATH_OP_SQRT12" },
    MathOpDef { mnemonic: "ABS12", shape: MathShape::Unary, op_symbol: "MATH_OP_ABS12" },
    // Clamp
    MathOpDef { mnemonic: "CLAMP_U24", shape: MathShape::Clamp, op_symbol: "MATH_OP_CLAMP_U" },
    MathOpDef { mnemonic: "CLAMP_S24", shape: MathShape::Clamp, op_symbol: "MATH_OP_CLAMP_S" },
    MathOpDef { mnemonic: "CLAMP12_U", shape: MathShape::Clamp, op_symbol: "MATH_OP_CLAMP12_U" },
    MathOpDef { mnemonic: "CLAMP12_S", shape: MathShape::Clamp, op_symbol: "MATH_OP_CLAMP12_S" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PseudoOp {
    Jump(JumpKind),
    Math(&'static MathOpDef),
    PackDiad,
    UnpackDiad,
    DiadMovui,
}

impl PseudoOp {
    /// Pseudo lookup wins over the spec table for the shared control-flow
    /// mnemonics; the one-word forms are emitted by the expansion itself.
    pub fn from_mnemonic(mnemonic: &str) -> Option<PseudoOp> {
        match mnemonic {
            "JCCUI" => Some(PseudoOp::Jump(JumpKind::Jcc)),
            "JSRUI" => Some(PseudoOp::Jump(JumpKind::Jsr)),
            "SWIUI" => Some(PseudoOp::Jump(JumpKind::Swi)),
            "PACK_DIAD" => Some(PseudoOp::PackDiad),
            "UNPACK_DIAD" => Some(PseudoOp::UnpackDiad),
            "DIAD_MOVUI" => Some(PseudoOp::DiadMovui),
            _ => MATH_OPS
                .iter()
                .find(|def| def.mnemonic == mnemonic)
                .map(PseudoOp::Math),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PseudoOp::Jump(kind) => kind.name(),
            PseudoOp::Math(def) => def.mnemonic,
            PseudoOp::PackDiad => "PACK_DIAD",
            PseudoOp::UnpackDiad => "UNPACK_DIAD",
            PseudoOp::DiadMovui => "DIAD_MOVUI",
        }
    }

    /// Expansion length in words, fixed at pass-1 time.
    pub fn expansion_len(self) -> u32 {
        match self {
            PseudoOp::Jump(_) => 4,
            PseudoOp::Math(def) => def.shape.expansion_len(),
            PseudoOp::PackDiad => 6,
            PseudoOp::UnpackDiad => 5,
            PseudoOp::DiadMovui => 3,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expansion_lengths() {
        assert_eq!(PseudoOp::from_mnemonic("JCCUI").unwrap().expansion_len(), 4);
        assert_eq!(PseudoOp::from_mnemonic("MULU24").unwrap().expansion_len(), 9);
        assert_eq!(PseudoOp::from_mnemonic("MODU24").unwrap().expansion_len(), 8);
        assert_eq!(PseudoOp::from_mnemonic("SQRTU24").unwrap().expansion_len(), 7);
        assert_eq!(PseudoOp::from_mnemonic("CLAMP_S24").unwrap().expansion_len(), 9);
        assert_eq!(PseudoOp::from_mnemonic("PACK_DIAD").unwrap().expansion_len(), 6);
        assert_eq!(PseudoOp::from_mnemonic("UNPACK_DIAD").unwrap().expansion_len(), 5);
        assert_eq!(PseudoOp::from_mnemonic("DIAD_MOVUI").unwrap().expansion_len(), 3);
        assert!(PseudoOp::from_mnemonic("ADDUR").is_none());
    }

    #[test]
    fn every_math_op_has_a_builtin_symbol() {
        for def in MATH_OPS {
            assert!(
                amber::builtins::BUILTIN_SYMBOLS
                    .iter()
                    .any(|(name, _)| *name == def.op_symbol),
                "{} references unknown symbol {}",
                def.mnemonic,
                def.op_symbol
            );
        }
    }
}

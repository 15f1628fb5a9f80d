//! Register-allocating code generation.
//!
//! Every lowering is strongly typed: the destination type is known before
//! operand evaluation and any mismatch aborts with a precise error. Scalar
//! locals and temporaries are bump-allocated onto `DR1..DR15` / `AR1..AR3`
//! (no spilling; exhaustion is a static error). `DR0` is the scalar return
//! register, `AR0` the callee-saved stack pointer, `AR1` the default address
//! return. Parameters take `DR0..` / `AR1..` in declaration order unless a
//! register pin says otherwise.
//!
//! Prologue and epilogue are synthesized after the body so the exact set of
//! allocator-used registers is known: push the address then data registers
//! above the parameter high-water mark, allocate the frame for struct/array
//! locals, and mirror it all before every `RET`.

use crate::ast::{AssignOp, BinOp, Decl, Expr, FuncDecl, Pos, Program, Stmt, VarDecl};
use crate::error::{codegen_error, type_error, Result};
use crate::types::{addr_of, ArrayDef, Type};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

const MAX_DR: u8 = 15;
const MAX_AR: u8 = 3;
const STACK_WORDS: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Reg {
    Dr(u8),
    Ar(u8),
}

impl Reg {
    fn is_addr(self) -> bool {
        matches!(self, Reg::Ar(_))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reg::Dr(n) => write!(f, "DR{}", n),
            Reg::Ar(n) => write!(f, "AR{}", n),
        }
    }
}

fn reg_from_hint(hint: &str, pos: Pos) -> Result<Reg> {
    let h = hint.trim().to_ascii_uppercase();
    if let Ok(n) = amber::enums::parse_dr(&h) {
        return Ok(Reg::Dr(n as u8));
    }
    if let Ok(n) = amber::enums::parse_ar(&h) {
        return Ok(Reg::Ar(n as u8));
    }
    Err(codegen_error(pos, format!("invalid register hint '{}'", hint)))
}

#[derive(Clone)]
struct FnSig {
    params: Vec<(Type, Option<String>)>,
    ret_ty: Option<Type>,
    ret_hint: Option<String>,
}

pub struct CodeGen {
    lines: Vec<String>,
    sym_regs: HashMap<String, Reg>,
    sym_types: HashMap<String, Type>,
    next_dr: u8,
    next_ar: u8,
    fn_sigs: HashMap<String, FnSig>,
    // per-function bookkeeping
    ret_indices: Vec<usize>,
    func_start_idx: usize,
    dr_base: u8,
    ar_base: u8,
    init_sp_in_prologue: bool,
    label_counter: u32,
    cur_ret_reg: Option<Reg>,
    cur_ret_ty: Option<Type>,
    loop_stack: Vec<(String, String)>,
    frame_words: u32,
    frame_locals: Vec<(String, u32, Reg)>,
}

impl CodeGen {
    pub fn new() -> CodeGen {
        CodeGen {
            lines: Vec::new(),
            sym_regs: HashMap::new(),
            sym_types: HashMap::new(),
            next_dr: 1,
            next_ar: 1,
            fn_sigs: HashMap::new(),
            ret_indices: Vec::new(),
            func_start_idx: 0,
            dr_base: 1,
            ar_base: 1,
            init_sp_in_prologue: false,
            label_counter: 0,
            cur_ret_reg: None,
            cur_ret_ty: None,
            loop_stack: Vec::new(),
            frame_words: 0,
            frame_locals: Vec::new(),
        }
    }

    fn inst(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("    {}", text.as_ref()));
    }

    fn raw(&mut self, line: String) {
        self.lines.push(line);
    }

    fn comment(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("    ; {}", text.as_ref()));
    }

    fn new_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!("__sk_{}_{}", prefix, self.label_counter)
    }

    fn alloc_data(&mut self, pos: Pos) -> Result<Reg> {
        if self.next_dr > MAX_DR {
            return Err(codegen_error(
                pos,
                "out of data registers; no spilling is performed",
            ));
        }
        let reg = Reg::Dr(self.next_dr);
        self.next_dr += 1;
        Ok(reg)
    }

    fn alloc_ar(&mut self, pos: Pos) -> Result<Reg> {
        if self.next_ar > MAX_AR {
            return Err(codegen_error(
                pos,
                "out of address registers; no spilling is performed",
            ));
        }
        let reg = Reg::Ar(self.next_ar);
        self.next_ar += 1;
        Ok(reg)
    }

    fn alloc_for(&mut self, ty: &Type, pos: Pos) -> Result<Reg> {
        if ty.is_addr_like() {
            self.alloc_ar(pos)
        } else {
            self.alloc_data(pos)
        }
    }

    // ---- Program ----------------------------------------------------------

    pub fn gen_program(&mut self, program: &Program) -> Result<String> {
        self.lines.clear();
        self.fn_sigs.clear();
        self.label_counter = 0;

        self.raw("    .org 0".to_string());

        for decl in &program.decls {
            if let Decl::Var(var) = decl {
                if var.is_global {
                    self.gen_global(var)?;
                }
            }
        }

        for decl in &program.decls {
            if let Decl::Func(func) = decl {
                self.fn_sigs.insert(
                    func.name.clone(),
                    FnSig {
                        params: func
                            .params
                            .iter()
                            .map(|p| (p.ty.clone(), p.reg_hint.clone()))
                            .collect(),
                        ret_ty: func.ret_ty.clone(),
                        ret_hint: func.ret_reg_hint.clone(),
                    },
                );
            }
        }

        for decl in &program.decls {
            if let Decl::Func(func) = decl {
                self.gen_func(func)?;
            }
        }

        // Zeroed stack region; 'main' points AR0 at its top.
        self.comment("--- stack region ---");
        self.raw("__skald_stack_area:".to_string());
        for _ in 0..STACK_WORDS {
            self.inst(".dw24 #0");
        }
        self.raw("__skald_stack_top:".to_string());

        Ok(self.lines.join("\n") + "\n")
    }

    fn gen_global(&mut self, var: &VarDecl) -> Result<()> {
        let value = match &var.init {
            None => 0u64,
            Some(Expr::Int { value, .. }) => *value as u64,
            Some(init) => {
                return Err(type_error(
                    init.pos(),
                    "global initializer must be an integer literal",
                ));
            }
        };
        match &var.ty {
            Type::Struct(_) | Type::Array(_) => Err(codegen_error(
                var.pos,
                "global struct/array variables are not supported",
            )),
            Type::Addr(_) => {
                // Two words: low then high half of the 48-bit value.
                let value = value & 0xFFFF_FFFF_FFFF;
                self.raw(format!("{}:", var.name));
                self.inst(format!(".dw24 #{}", value & 0xFF_FFFF));
                self.inst(format!(".dw24 #{}", (value >> 24) & 0xFF_FFFF));
                Ok(())
            }
            _ => {
                self.raw(format!("{}:", var.name));
                self.inst(format!(".dw24 #{}", value & 0xFF_FFFF));
                Ok(())
            }
        }
    }

    // ---- Functions --------------------------------------------------------

    fn gen_func(&mut self, func: &FuncDecl) -> Result<()> {
        debug!(function = %func.name, "generating function");
        self.sym_regs.clear();
        self.sym_types.clear();
        self.next_dr = 1;
        self.next_ar = 1;
        self.ret_indices.clear();
        self.frame_words = 0;
        self.frame_locals.clear();
        self.loop_stack.clear();

        self.raw(format!("{}:", func.name));
        self.func_start_idx = self.lines.len();
        self.comment("prologue (callee-saved)");
        self.init_sp_in_prologue = func.name == "main";

        // Parameters take DR0.. / AR1.. in declaration order unless pinned.
        let mut next_param_dr: u8 = 0;
        let mut next_param_ar: u8 = 1;
        let mut used_dr_max: Option<u8> = None;
        let mut used_ar_max: Option<u8> = None;
        for param in &func.params {
            let reg = match &param.reg_hint {
                Some(hint) => reg_from_hint(hint, param.pos)?,
                None if param.ty.is_addr_like() => {
                    if next_param_ar > MAX_AR {
                        return Err(codegen_error(
                            param.pos,
                            "out of address registers for parameters",
                        ));
                    }
                    let reg = Reg::Ar(next_param_ar);
                    next_param_ar += 1;
                    reg
                }
                None => {
                    if next_param_dr > MAX_DR {
                        return Err(codegen_error(
                            param.pos,
                            "out of data registers for parameters",
                        ));
                    }
                    let reg = Reg::Dr(next_param_dr);
                    next_param_dr += 1;
                    reg
                }
            };
            if reg.is_addr() != param.ty.is_addr_like() {
                return Err(type_error(
                    param.pos,
                    format!(
                        "parameter '{}' of type {} cannot live in {}",
                        param.name, param.ty, reg
                    ),
                ));
            }
            self.sym_regs.insert(param.name.clone(), reg);
            self.sym_types.insert(param.name.clone(), param.ty.clone());
            self.comment(format!("param {}:{} in {}", param.name, param.ty, reg));
            match reg {
                Reg::Dr(n) => used_dr_max = Some(used_dr_max.map_or(n, |m| m.max(n))),
                Reg::Ar(n) => used_ar_max = Some(used_ar_max.map_or(n, |m| m.max(n))),
            }
        }

        // Locals and temporaries allocate above the parameter registers;
        // DR0 and AR0 stay reserved either way.
        self.next_dr = used_dr_max.map_or(1, |m| (m + 1).max(1));
        self.next_ar = used_ar_max.map_or(1, |m| (m + 1).max(1));

        let ret_reg = match (&func.ret_ty, &func.ret_reg_hint) {
            (None, _) => None,
            (Some(ty), Some(hint)) => {
                let reg = reg_from_hint(hint, func.pos)?;
                if reg.is_addr() != ty.is_addr_like() {
                    return Err(type_error(
                        func.pos,
                        format!("return type {} cannot live in {}", ty, reg),
                    ));
                }
                Some(reg)
            }
            (Some(ty), None) => Some(if ty.is_addr_like() {
                Reg::Ar(1)
            } else {
                Reg::Dr(0)
            }),
        };

        self.dr_base = self.next_dr;
        self.ar_base = self.next_ar;

        // Struct/array locals get a frame slot and a base-pointer register,
        // wherever in the body they are declared.
        let frame_decls = collect_frame_locals(&func.body);
        for var in &frame_decls {
            if self.frame_locals.iter().any(|(name, _, _)| name == &var.name) {
                return Err(codegen_error(
                    var.pos,
                    format!("duplicate aggregate local '{}'", var.name),
                ));
            }
            let reg = self.alloc_ar(var.pos)?;
            self.sym_regs.insert(var.name.clone(), reg);
            self.sym_types.insert(var.name.clone(), var.ty.clone());
            let offset = self.frame_words;
            self.frame_words += var.ty.size_words();
            self.frame_locals.push((var.name.clone(), offset, reg));
            self.comment(format!(
                "alloc frame for {}:{} size {}w -> {} at +{}",
                var.name,
                var.ty,
                var.ty.size_words(),
                reg,
                offset
            ));
        }

        self.cur_ret_reg = ret_reg;
        self.cur_ret_ty = func.ret_ty.clone();
        for stmt in &func.body {
            self.gen_stmt(stmt)?;
        }
        if func.ret_ty.is_none() {
            self.inst("RET");
            self.ret_indices.push(self.lines.len() - 1);
        }
        self.cur_ret_reg = None;
        self.cur_ret_ty = None;

        self.insert_prologue();
        self.insert_epilogues();
        Ok(())
    }

    fn insert_prologue(&mut self) {
        let mut prologue: Vec<String> = Vec::new();
        if self.init_sp_in_prologue {
            prologue.push("    ADRAso #__skald_stack_top, AR0".to_string());
        }
        for idx in self.ar_base..self.next_ar {
            prologue.push(format!("    PUSHAur AR{}, AR0", idx));
        }
        for idx in self.dr_base..self.next_dr {
            prologue.push(format!("    PUSHur DR{}, AR0", idx));
        }
        if self.frame_words > 0 {
            prologue.push(format!("    SUBASI #{}, AR0", self.frame_words));
            for (_, offset, reg) in &self.frame_locals {
                prologue.push(format!("    LEASO AR0, #{}, {}", offset, reg));
            }
        }
        if prologue.is_empty() {
            return;
        }
        let insert_at = self.func_start_idx + 1; // after the prologue comment
        let added = prologue.len();
        self.lines.splice(insert_at..insert_at, prologue);
        for idx in self.ret_indices.iter_mut() {
            if *idx >= insert_at {
                *idx += added;
            }
        }
    }

    fn insert_epilogues(&mut self) {
        let mut epilogue: Vec<String> = Vec::new();
        if self.frame_words > 0 {
            epilogue.push(format!("    ADDASI #{}, AR0", self.frame_words));
        }
        for idx in (self.dr_base..self.next_dr).rev() {
            epilogue.push(format!("    POPur AR0, DR{}", idx));
        }
        for idx in (self.ar_base..self.next_ar).rev() {
            epilogue.push(format!("    POPAur AR0, AR{}", idx));
        }
        if epilogue.is_empty() {
            return;
        }
        let mut positions = self.ret_indices.clone();
        positions.sort_unstable();
        for pos in positions.into_iter().rev() {
            self.lines.splice(pos..pos, epilogue.iter().cloned());
        }
    }

    // ---- Statements -------------------------------------------------------

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Let(var) => self.gen_local_let(var),
            Stmt::Return { value, pos } => self.gen_return(value.as_ref(), *pos),
            Stmt::Assign {
                target,
                op,
                value,
                pos,
            } => self.gen_assign(target, *op, value, *pos),
            Stmt::Expr(expr) => self.gen_expr_stmt(expr),
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => self.gen_if(cond, then_body, else_body.as_deref()),
            Stmt::While { cond, body, .. } => self.gen_while(cond, body),
            Stmt::Break(pos) => self.gen_break(*pos),
            Stmt::Continue(pos) => self.gen_continue(*pos),
        }
    }

    fn gen_local_let(&mut self, var: &VarDecl) -> Result<()> {
        match &var.ty {
            Type::Struct(_) | Type::Array(_) => {
                // Pre-allocated in the prologue with a base pointer.
                let reg = self.sym_regs[&var.name];
                self.comment(format!("let {}:{} -> {} (frame)", var.name, var.ty, reg));
                if var.init.is_some() {
                    return Err(codegen_error(
                        var.pos,
                        "aggregate initializer not supported; assign fields individually",
                    ));
                }
                Ok(())
            }
            _ => {
                let reg = self.alloc_for(&var.ty, var.pos)?;
                self.sym_regs.insert(var.name.clone(), reg);
                self.sym_types.insert(var.name.clone(), var.ty.clone());
                self.comment(format!("let {}:{} -> {}", var.name, var.ty, reg));
                if let Some(init) = &var.init {
                    self.gen_expr_into(init, &var.ty, reg)?;
                }
                Ok(())
            }
        }
    }

    fn gen_expr_stmt(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Call { .. } => {
                self.gen_call(expr, false)?;
                Ok(())
            }
            _ => Err(codegen_error(
                expr.pos(),
                "only function calls are permitted as expression statements",
            )),
        }
    }

    fn gen_if(&mut self, cond: &Expr, then_body: &[Stmt], else_body: Option<&[Stmt]>) -> Result<()> {
        let cond_reg = self.gen_eval_data_any(cond)?;
        self.inst(format!("TSTUR {}", cond_reg));
        let has_else = else_body.map_or(false, |body| !body.is_empty());
        let else_label = has_else.then(|| self.new_label("else"));
        let end_label = self.new_label("endif");
        let target = else_label.as_deref().unwrap_or(&end_label);
        self.inst(format!("BCCso EQ, {}", target));
        for stmt in then_body {
            self.gen_stmt(stmt)?;
        }
        if has_else {
            self.inst(format!("BALso {}", end_label));
            self.raw(format!("{}:", else_label.unwrap()));
            for stmt in else_body.unwrap_or_default() {
                self.gen_stmt(stmt)?;
            }
        }
        self.raw(format!("{}:", end_label));
        Ok(())
    }

    fn gen_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<()> {
        let begin_label = self.new_label("while");
        let end_label = self.new_label("endwhile");
        self.raw(format!("{}:", begin_label));
        self.loop_stack.push((begin_label.clone(), end_label.clone()));
        let cond_reg = self.gen_eval_data_any(cond)?;
        self.inst(format!("TSTUR {}", cond_reg));
        self.inst(format!("BCCso EQ, {}", end_label));
        for stmt in body {
            self.gen_stmt(stmt)?;
        }
        self.inst(format!("BALso {}", begin_label));
        self.raw(format!("{}:", end_label));
        self.loop_stack.pop();
        Ok(())
    }

    fn gen_break(&mut self, pos: Pos) -> Result<()> {
        let Some((_, end_label)) = self.loop_stack.last().cloned() else {
            return Err(codegen_error(pos, "'break' used outside of a loop"));
        };
        self.inst(format!("BALso {}", end_label));
        Ok(())
    }

    fn gen_continue(&mut self, pos: Pos) -> Result<()> {
        let Some((begin_label, _)) = self.loop_stack.last().cloned() else {
            return Err(codegen_error(pos, "'continue' used outside of a loop"));
        };
        self.inst(format!("BALso {}", begin_label));
        Ok(())
    }

    fn gen_return(&mut self, value: Option<&Expr>, pos: Pos) -> Result<()> {
        match self.cur_ret_ty.clone() {
            None => {
                if value.is_some() {
                    return Err(type_error(pos, "void function cannot return a value"));
                }
                self.inst("RET");
                self.ret_indices.push(self.lines.len() - 1);
                Ok(())
            }
            Some(ret_ty) => {
                let Some(value) = value else {
                    return Err(type_error(pos, "return requires a value here"));
                };
                let ret_reg = self
                    .cur_ret_reg
                    .ok_or_else(|| codegen_error(pos, "missing return register"))?;
                self.gen_expr_into(value, &ret_ty, ret_reg)?;
                self.inst("RET");
                self.ret_indices.push(self.lines.len() - 1);
                Ok(())
            }
        }
    }

    // ---- Assignment -------------------------------------------------------

    fn gen_assign(&mut self, target: &Expr, op: AssignOp, value: &Expr, pos: Pos) -> Result<()> {
        match target {
            Expr::Name { ident, .. } => self.gen_assign_name(ident, op, value, pos),
            Expr::Field { base, field, .. } => self.gen_assign_field(base, field, op, value, pos),
            Expr::Index { base, index, .. } => self.gen_assign_index(base, index, op, value, pos),
            _ => Err(codegen_error(pos, "unsupported assignment target")),
        }
    }

    fn gen_assign_name(&mut self, ident: &str, op: AssignOp, value: &Expr, pos: Pos) -> Result<()> {
        let Some(dst) = self.sym_regs.get(ident).copied() else {
            return Err(codegen_error(
                pos,
                format!("assignment to unknown variable '{}'", ident),
            ));
        };
        let ty = self.sym_types[ident].clone();

        if op == AssignOp::Set {
            return self.gen_expr_into(value, &ty, dst);
        }
        match &ty {
            Type::Struct(_) | Type::Array(_) => Err(codegen_error(
                pos,
                "cannot operate on an aggregate value; address its fields or elements",
            )),
            Type::Addr(_) => {
                // Address arithmetic: '+='/'-=' with a data delta; the
                // delta's signedness selects the address-ALU form.
                if !matches!(op, AssignOp::Add | AssignOp::Sub) {
                    return Err(type_error(
                        pos,
                        "only '+=' and '-=' are supported for addresses",
                    ));
                }
                let delta_ty = self.addr_delta_type(value, pos)?;
                let delta = self.gen_eval(value, &delta_ty)?;
                let mnemonic = match (op, delta_ty.is_signed()) {
                    (AssignOp::Add, true) => "ADDASR",
                    (AssignOp::Add, false) => "ADDAUR",
                    (AssignOp::Sub, true) => "SUBASR",
                    (AssignOp::Sub, false) => "SUBAUR",
                    _ => unreachable!(),
                };
                self.inst(format!("{} {}, {}", mnemonic, delta, dst));
                Ok(())
            }
            _ => {
                let rhs = match op {
                    AssignOp::Shl | AssignOp::Shr | AssignOp::Rol | AssignOp::Ror => {
                        self.gen_eval_data_any(value)?
                    }
                    _ => self.gen_eval(value, &ty)?,
                };
                let mnemonic = compound_mnemonic(op, ty.is_signed());
                self.inst(format!("{} {}, {}", mnemonic, rhs, dst));
                Ok(())
            }
        }
    }

    fn gen_assign_field(
        &mut self,
        base: &Expr,
        field: &str,
        op: AssignOp,
        value: &Expr,
        pos: Pos,
    ) -> Result<()> {
        let (areg, field_ty, offset) = self.resolve_field(base, field, pos)?;

        if op == AssignOp::Set {
            let src = self.gen_eval(value, &field_ty)?;
            if field_ty.is_addr_like() {
                self.inst(format!("STASO {}, #{}, {}", src, offset, areg));
            } else {
                self.inst(format!("STSO {}, #{}, {}", src, offset, areg));
            }
            return Ok(());
        }

        if field_ty.is_addr_like() {
            if !matches!(op, AssignOp::Add | AssignOp::Sub) {
                return Err(type_error(
                    pos,
                    "only '+=' and '-=' are supported for address fields",
                ));
            }
            let tmp = self.alloc_ar(pos)?;
            self.inst(format!("LDASO #{}, {}, {}", offset, areg, tmp));
            let delta_ty = self.addr_delta_type(value, pos)?;
            let delta = self.gen_eval(value, &delta_ty)?;
            let mnemonic = match (op, delta_ty.is_signed()) {
                (AssignOp::Add, true) => "ADDASR",
                (AssignOp::Add, false) => "ADDAUR",
                (AssignOp::Sub, true) => "SUBASR",
                (AssignOp::Sub, false) => "SUBAUR",
                _ => unreachable!(),
            };
            self.inst(format!("{} {}, {}", mnemonic, delta, tmp));
            self.inst(format!("STASO {}, #{}, {}", tmp, offset, areg));
            return Ok(());
        }

        // Data field: load, apply, store back.
        let current = self.alloc_data(pos)?;
        self.inst(format!("LDSO #{}, {}, {}", offset, areg, current));
        let rhs = match op {
            AssignOp::Shl | AssignOp::Shr | AssignOp::Rol | AssignOp::Ror => {
                self.gen_eval_data_any(value)?
            }
            _ => self.gen_eval(value, &field_ty)?,
        };
        let mnemonic = compound_mnemonic(op, field_ty.is_signed());
        self.inst(format!("{} {}, {}", mnemonic, rhs, current));
        self.inst(format!("STSO {}, #{}, {}", current, offset, areg));
        Ok(())
    }

    fn gen_assign_index(
        &mut self,
        base: &Expr,
        index: &Expr,
        op: AssignOp,
        value: &Expr,
        pos: Pos,
    ) -> Result<()> {
        let (areg, def) = self.resolve_array(base, pos)?;
        let elem_ty = def.elem.clone();
        let (addr_base, offset) = self.array_elem_addr(areg, &def, index, pos)?;

        if op == AssignOp::Set {
            let src = self.gen_eval(value, &elem_ty)?;
            if elem_ty.is_addr_like() {
                self.inst(format!("STASO {}, #{}, {}", src, offset, addr_base));
            } else {
                self.inst(format!("STSO {}, #{}, {}", src, offset, addr_base));
            }
            return Ok(());
        }

        if elem_ty.is_addr_like() {
            if !matches!(op, AssignOp::Add | AssignOp::Sub) {
                return Err(type_error(
                    pos,
                    "only '+=' and '-=' are supported for address elements",
                ));
            }
            let tmp = self.alloc_ar(pos)?;
            self.inst(format!("LDASO #{}, {}, {}", offset, addr_base, tmp));
            let delta_ty = self.addr_delta_type(value, pos)?;
            let delta = self.gen_eval(value, &delta_ty)?;
            let mnemonic = match (op, delta_ty.is_signed()) {
                (AssignOp::Add, true) => "ADDASR",
                (AssignOp::Add, false) => "ADDAUR",
                (AssignOp::Sub, true) => "SUBASR",
                (AssignOp::Sub, false) => "SUBAUR",
                _ => unreachable!(),
            };
            self.inst(format!("{} {}, {}", mnemonic, delta, tmp));
            self.inst(format!("STASO {}, #{}, {}", tmp, offset, addr_base));
            return Ok(());
        }

        let current = self.alloc_data(pos)?;
        self.inst(format!("LDSO #{}, {}, {}", offset, addr_base, current));
        let rhs = match op {
            AssignOp::Shl | AssignOp::Shr | AssignOp::Rol | AssignOp::Ror => {
                self.gen_eval_data_any(value)?
            }
            _ => self.gen_eval(value, &elem_ty)?,
        };
        let mnemonic = compound_mnemonic(op, elem_ty.is_signed());
        self.inst(format!("{} {}, {}", mnemonic, rhs, current));
        self.inst(format!("STSO {}, #{}, {}", current, offset, addr_base));
        Ok(())
    }

    fn addr_delta_type(&self, value: &Expr, pos: Pos) -> Result<Type> {
        match value {
            Expr::Name { ident, .. } => {
                let ty = self
                    .sym_types
                    .get(ident)
                    .ok_or_else(|| codegen_error(pos, format!("unknown identifier '{}'", ident)))?;
                if ty.is_addr_like() {
                    return Err(type_error(
                        pos,
                        "cannot use an address value as the delta of '+='/'-='",
                    ));
                }
                Ok(ty.clone())
            }
            Expr::Int { .. } => Ok(Type::U24),
            _ => Err(type_error(
                pos,
                "address '+='/'-=' requires a u24/s24 variable or literal",
            )),
        }
    }

    // ---- Lvalue helpers ---------------------------------------------------

    fn resolve_field(&self, base: &Expr, field: &str, pos: Pos) -> Result<(Reg, Type, u32)> {
        let Expr::Name { ident, .. } = base else {
            return Err(codegen_error(pos, "complex field bases are not supported"));
        };
        let (Some(reg), Some(base_ty)) = (self.sym_regs.get(ident), self.sym_types.get(ident))
        else {
            return Err(codegen_error(
                pos,
                format!("unknown struct variable '{}'", ident),
            ));
        };
        let Type::Struct(def) = base_ty else {
            return Err(type_error(pos, "field access on a non-struct variable"));
        };
        let found = def.fields.iter().find(|f| f.name == field).ok_or_else(|| {
            codegen_error(pos, format!("unknown field '{}' on '{}'", field, ident))
        })?;
        Ok((*reg, found.ty.clone(), found.offset))
    }

    fn resolve_array(&self, base: &Expr, pos: Pos) -> Result<(Reg, Rc<ArrayDef>)> {
        let Expr::Name { ident, .. } = base else {
            return Err(codegen_error(pos, "complex index bases are not supported"));
        };
        let (Some(reg), Some(base_ty)) = (self.sym_regs.get(ident), self.sym_types.get(ident))
        else {
            return Err(codegen_error(
                pos,
                format!("unknown array variable '{}'", ident),
            ));
        };
        let Type::Array(def) = base_ty else {
            return Err(type_error(pos, "indexing a non-array variable"));
        };
        Ok((*reg, def.clone()))
    }

    /// Element address as `(base register, static offset)`. Constant indices
    /// fold into the offset; dynamic indices compute an address temporary
    /// (two-word elements scale the index by one shift).
    fn array_elem_addr(
        &mut self,
        base: Reg,
        def: &ArrayDef,
        index: &Expr,
        pos: Pos,
    ) -> Result<(Reg, u32)> {
        if let Expr::Int { value, .. } = index {
            if *value < 0 || *value as u32 >= def.len {
                return Err(codegen_error(
                    pos,
                    format!("index {} out of bounds for length {}", value, def.len),
                ));
            }
            return Ok((base, *value as u32 * def.elem_words));
        }
        let idx = self.gen_eval_data_any(index)?;
        let addr = self.alloc_ar(pos)?;
        self.inst(format!("LEASO {}, #0, {}", base, addr));
        if def.elem_words == 2 {
            let scaled = self.alloc_data(pos)?;
            self.inst(format!("MOVur {}, {}", idx, scaled));
            self.inst(format!("SHLUI #1, {}", scaled));
            self.inst(format!("ADDAUR {}, {}", scaled, addr));
        } else {
            self.inst(format!("ADDAUR {}, {}", idx, addr));
        }
        Ok((addr, 0))
    }

    // ---- Expressions ------------------------------------------------------

    /// Evaluate `e` as a value of exactly `ty`. Plain names come back in
    /// their home register; computed values get a fresh temporary.
    fn gen_eval(&mut self, e: &Expr, ty: &Type) -> Result<Reg> {
        match e {
            Expr::Int { .. } | Expr::Not { .. } | Expr::Binary { .. } => {
                let dst = self.alloc_for(ty, e.pos())?;
                self.gen_expr_into(e, ty, dst)?;
                Ok(dst)
            }
            Expr::Name { ident, pos } => self.eval_name(ident, ty, *pos),
            Expr::Cast { target, expr, pos } => {
                if ty.is_addr_like() {
                    return Err(type_error(*pos, "cannot use a data cast in address context"));
                }
                if target != ty {
                    return Err(type_error(
                        *pos,
                        format!("cast result type mismatch: expected {}, found {}", ty, target),
                    ));
                }
                // Reinterpret: evaluate the inner expression at its own type
                // and hand the register over unchanged.
                let inner_ty = match self.expr_exact_type(expr) {
                    Some(inner_ty) => {
                        if inner_ty.is_addr_like() {
                            return Err(type_error(*pos, "cannot cast address values"));
                        }
                        inner_ty
                    }
                    None => target.clone(),
                };
                self.gen_eval(expr, &inner_ty)
            }
            Expr::AddressOf { .. } => self.eval_address_of(e, ty),
            Expr::Deref { .. } => self.eval_deref(e, ty),
            Expr::Call { .. } => {
                let reg = self.gen_call(e, true)?;
                match self.expr_exact_type(e) {
                    Some(ret_ty) if ret_ty != *ty => Err(type_error(
                        e.pos(),
                        format!("call returns {}, expected {}", ret_ty, ty),
                    )),
                    _ => Ok(reg),
                }
            }
            Expr::Field { base, field, pos } => {
                let (areg, field_ty, offset) = self.resolve_field(base, field, *pos)?;
                self.check_type(&field_ty, ty, *pos)?;
                let dst = self.alloc_for(&field_ty, *pos)?;
                if field_ty.is_addr_like() {
                    self.inst(format!("LDASO #{}, {}, {}", offset, areg, dst));
                } else {
                    self.inst(format!("LDSO #{}, {}, {}", offset, areg, dst));
                }
                Ok(dst)
            }
            Expr::Index { base, index, pos } => {
                let (areg, def) = self.resolve_array(base, *pos)?;
                let elem_ty = def.elem.clone();
                self.check_type(&elem_ty, ty, *pos)?;
                let (addr_base, offset) = self.array_elem_addr(areg, &def, index, *pos)?;
                let dst = self.alloc_for(&elem_ty, *pos)?;
                if elem_ty.is_addr_like() {
                    self.inst(format!("LDASO #{}, {}, {}", offset, addr_base, dst));
                } else {
                    self.inst(format!("LDSO #{}, {}, {}", offset, addr_base, dst));
                }
                Ok(dst)
            }
        }
    }

    /// Materialize `e` into `dst`.
    fn gen_expr_into(&mut self, e: &Expr, ty: &Type, dst: Reg) -> Result<()> {
        match e {
            Expr::Int { value, pos } => {
                if ty.is_addr_like() {
                    return Err(type_error(
                        *pos,
                        "integer literal not allowed in address context",
                    ));
                }
                if !(0..=0xFFF).contains(value) {
                    return Err(codegen_error(
                        *pos,
                        "literal does not fit in a 12-bit immediate; wider constants are not supported here",
                    ));
                }
                self.inst(format!("MOVui #{}, {}", value, dst));
                Ok(())
            }
            Expr::Not { expr, pos } => {
                if ty.is_addr_like() {
                    return Err(type_error(*pos, "bitwise not requires a data type"));
                }
                self.gen_expr_into(expr, ty, dst)?;
                self.inst(format!("NOTur {}", dst));
                Ok(())
            }
            Expr::Binary { op, lhs, rhs, pos } => {
                self.gen_binary_into(*op, lhs, rhs, ty, dst, *pos)
            }
            _ => {
                let src = self.gen_eval(e, ty)?;
                self.move_reg(src, dst);
                Ok(())
            }
        }
    }

    fn move_reg(&mut self, src: Reg, dst: Reg) {
        if src == dst {
            return;
        }
        match (src.is_addr(), dst.is_addr()) {
            (false, true) => self.inst(format!("MOVAur {}, {}, L", src, dst)),
            (true, false) => self.inst(format!("MOVDur {}, {}, L", src, dst)),
            (true, true) => self.inst(format!("LEASO {}, #0, {}", src, dst)),
            (false, false) => self.inst(format!("MOVur {}, {}", src, dst)),
        }
    }

    fn eval_name(&self, ident: &str, ty: &Type, pos: Pos) -> Result<Reg> {
        let Some(reg) = self.sym_regs.get(ident) else {
            return Err(codegen_error(pos, format!("unknown identifier '{}'", ident)));
        };
        let src_ty = &self.sym_types[ident];
        if src_ty.is_addr_like() != ty.is_addr_like() {
            return Err(type_error(
                pos,
                format!(
                    "type mismatch: expected {}, found {} for '{}'",
                    ty, src_ty, ident
                ),
            ));
        }
        match ty {
            Type::Addr(_) => match src_ty {
                Type::Addr(_) => {
                    if src_ty != ty {
                        return Err(type_error(
                            pos,
                            format!(
                                "type mismatch: expected {}, found {} for '{}'",
                                ty, src_ty, ident
                            ),
                        ));
                    }
                }
                _ => {
                    return Err(type_error(
                        pos,
                        format!("expected {}, found {}; use get_addr(...)", ty, src_ty),
                    ));
                }
            },
            Type::Struct(_) | Type::Array(_) => {
                if src_ty != ty {
                    return Err(type_error(
                        pos,
                        format!(
                            "type mismatch: expected {}, found {} for '{}'",
                            ty, src_ty, ident
                        ),
                    ));
                }
            }
            _ => {
                // No implicit u24 <-> s24 conversion.
                if src_ty != ty {
                    return Err(type_error(
                        pos,
                        format!(
                            "type mismatch: expected {}, found {} for '{}'",
                            ty, src_ty, ident
                        ),
                    ));
                }
            }
        }
        Ok(*reg)
    }

    fn gen_binary_into(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        ty: &Type,
        dst: Reg,
        pos: Pos,
    ) -> Result<()> {
        if op.is_comparison() {
            if ty.is_addr_like() {
                return Err(type_error(pos, "comparison result cannot be an address"));
            }
            let comp_ty = self.unify_compare_type(lhs, rhs, pos)?;
            let left = self.gen_eval(lhs, &comp_ty)?;
            let right = self.gen_eval(rhs, &comp_ty)?;
            let cmp = if comp_ty.is_signed() { "CMPSR" } else { "CMPUR" };
            // Flags reflect left - right.
            self.inst(format!("{} {}, {}", cmp, right, left));
            let out = if dst == left || dst == right {
                self.alloc_data(pos)?
            } else {
                dst
            };
            self.inst(format!("MOVui #0, {}", out));
            let cc = condition_code(op, comp_ty.is_signed());
            self.inst(format!("MCCsi {}, #1, {}", cc, out));
            if out != dst {
                self.move_reg(out, dst);
            }
            return Ok(());
        }

        if ty.is_addr_like() {
            return Err(type_error(pos, "binary operators require a data type"));
        }
        if matches!(op, BinOp::Mul | BinOp::Div) {
            return Err(codegen_error(
                pos,
                format!(
                    "'{}' has no scalar lowering; use the async math pseudo-instructions",
                    op.symbol()
                ),
            ));
        }

        // Work in the destination unless the right operand could clobber it
        // (a call, or a name bound to the destination register).
        let use_temp = expr_contains_call(rhs) || self.expr_reads_reg(rhs, dst);
        let work = if use_temp { self.alloc_data(pos)? } else { dst };

        self.gen_operand_into(lhs, ty, work)?;

        let rhs_reg = match op {
            // The shift amount may be either data type.
            BinOp::Shl | BinOp::Shr => self.gen_eval_data_any(rhs)?,
            _ => self.gen_eval(rhs, ty)?,
        };

        let mnemonic = match op {
            BinOp::Add => {
                if ty.is_signed() {
                    "ADDSR"
                } else {
                    "ADDUR"
                }
            }
            BinOp::Sub => {
                if ty.is_signed() {
                    "SUBSR"
                } else {
                    "SUBUR"
                }
            }
            BinOp::And => "ANDUR",
            BinOp::Or => "ORUR",
            BinOp::Xor => "XORUR",
            BinOp::Shl => "SHLUR",
            BinOp::Shr => {
                if ty.is_signed() {
                    "SHRSR"
                } else {
                    "SHRUR"
                }
            }
            _ => unreachable!(),
        };
        self.inst(format!("{} {}, {}", mnemonic, rhs_reg, work));

        if use_temp {
            self.move_reg(work, dst);
        }
        Ok(())
    }

    /// Left-operand placement: a name already living in `work` costs
    /// nothing; everything else materializes into it.
    fn gen_operand_into(&mut self, e: &Expr, ty: &Type, work: Reg) -> Result<()> {
        if let Expr::Name { ident, pos } = e {
            let reg = self.eval_name(ident, ty, *pos)?;
            if reg != work {
                self.move_reg(reg, work);
            }
            return Ok(());
        }
        self.gen_expr_into(e, ty, work)
    }

    /// Evaluate as a data value without enforcing signedness (shift counts,
    /// conditions, array indices). Addresses are rejected.
    fn gen_eval_data_any(&mut self, e: &Expr) -> Result<Reg> {
        match e {
            Expr::Name { ident, pos } => {
                let (Some(reg), Some(ty)) = (self.sym_regs.get(ident), self.sym_types.get(ident))
                else {
                    return Err(codegen_error(
                        *pos,
                        format!("unknown identifier '{}'", ident),
                    ));
                };
                if ty.is_addr_like() {
                    return Err(type_error(
                        *pos,
                        format!("expected a data value, found {}", ty),
                    ));
                }
                Ok(*reg)
            }
            Expr::Int { .. } => {
                let dst = self.alloc_data(e.pos())?;
                self.gen_expr_into(e, &Type::U24, dst)?;
                Ok(dst)
            }
            _ => self.gen_eval(e, &Type::U24),
        }
    }

    fn check_type(&self, found: &Type, expected: &Type, pos: Pos) -> Result<()> {
        if found != expected {
            return Err(type_error(
                pos,
                format!("type mismatch: expected {}, found {}", expected, found),
            ));
        }
        Ok(())
    }

    fn eval_address_of(&mut self, e: &Expr, expected: &Type) -> Result<Reg> {
        let Expr::AddressOf { target, pos } = e else {
            unreachable!()
        };
        let Type::Addr(expected_pointee) = expected else {
            return Err(type_error(*pos, "get_addr used in non-address context"));
        };
        match target.as_ref() {
            Expr::Field { base, field, pos } => {
                let (areg, field_ty, offset) = self.resolve_field(base, field, *pos)?;
                if **expected_pointee != field_ty {
                    return Err(type_error(
                        *pos,
                        format!(
                            "type mismatch: get_addr of this field yields addr<{}>",
                            field_ty
                        ),
                    ));
                }
                let dst = self.alloc_ar(*pos)?;
                self.inst(format!("LEASO {}, #{}, {}", areg, offset, dst));
                Ok(dst)
            }
            Expr::Name { ident, pos } => match self.sym_types.get(ident) {
                Some(ty @ (Type::Struct(_) | Type::Array(_))) => {
                    if **expected_pointee != *ty {
                        return Err(type_error(
                            *pos,
                            format!("type mismatch: get_addr of '{}' yields addr<{}>", ident, ty),
                        ));
                    }
                    Ok(self.sym_regs[ident])
                }
                Some(_) => Err(codegen_error(
                    *pos,
                    "cannot take the address of a register-backed local; use a struct field",
                )),
                None => Err(codegen_error(*pos, "get_addr on globals is not supported")),
            },
            _ => Err(type_error(
                *pos,
                "get_addr argument must be a variable or field access",
            )),
        }
    }

    fn eval_deref(&mut self, e: &Expr, expected: &Type) -> Result<Reg> {
        let Expr::Deref { addr, pos } = e else {
            unreachable!()
        };
        let Expr::AddressOf { target, .. } = addr.as_ref() else {
            return Err(type_error(
                *pos,
                "get_content requires an address produced by get_addr(...)",
            ));
        };
        if let Expr::Name { ident, .. } = target.as_ref() {
            if matches!(
                self.sym_types.get(ident),
                Some(Type::Struct(_) | Type::Array(_))
            ) {
                return Err(type_error(
                    *pos,
                    "cannot load an entire aggregate with get_content; load its fields",
                ));
            }
        }
        let ar = self.eval_address_of(addr, &addr_of(expected.clone()))?;
        let dst = self.alloc_for(expected, *pos)?;
        if expected.is_addr_like() {
            self.inst(format!("LDASO #0, {}, {}", ar, dst));
        } else {
            self.inst(format!("LDSO #0, {}, {}", ar, dst));
        }
        Ok(dst)
    }

    // ---- Calls ------------------------------------------------------------

    fn gen_call(&mut self, e: &Expr, expect_value: bool) -> Result<Reg> {
        let Expr::Call { callee, args, pos } = e else {
            unreachable!()
        };
        let sig = self
            .fn_sigs
            .get(callee)
            .cloned()
            .ok_or_else(|| codegen_error(*pos, format!("unknown function '{}'", callee)))?;
        if args.len() != sig.params.len() {
            return Err(codegen_error(
                *pos,
                format!(
                    "function '{}' expects {} argument(s), got {}",
                    callee,
                    sig.params.len(),
                    args.len()
                ),
            ));
        }

        // Arguments land in the callee's parameter registers.
        let mut next_dr: u8 = 0;
        let mut next_ar: u8 = 1;
        for (arg, (param_ty, hint)) in args.iter().zip(&sig.params) {
            let src = self.gen_eval(arg, param_ty)?;
            let target = match hint {
                Some(hint) => reg_from_hint(hint, *pos)?,
                None if param_ty.is_addr_like() => {
                    let reg = Reg::Ar(next_ar);
                    next_ar += 1;
                    reg
                }
                None => {
                    let reg = Reg::Dr(next_dr);
                    next_dr += 1;
                    reg
                }
            };
            self.move_reg(src, target);
        }

        self.inst(format!("BSRso {}", callee));

        match sig.ret_ty {
            None => {
                if expect_value {
                    return Err(type_error(
                        *pos,
                        format!("void function '{}' used in expression context", callee),
                    ));
                }
                Ok(Reg::Dr(0))
            }
            Some(ret_ty) => Ok(match sig.ret_hint {
                Some(hint) => reg_from_hint(&hint, *pos)?,
                None if ret_ty.is_addr_like() => Reg::Ar(1),
                None => Reg::Dr(0),
            }),
        }
    }

    // ---- Strict-typing helpers --------------------------------------------

    /// Best-effort exact type of an expression. `None` when not statically
    /// known (literals, arithmetic).
    fn expr_exact_type(&self, e: &Expr) -> Option<Type> {
        match e {
            Expr::Name { ident, .. } => self.sym_types.get(ident).cloned(),
            Expr::Field { base, field, .. } => {
                let Expr::Name { ident, .. } = base.as_ref() else {
                    return None;
                };
                let Type::Struct(def) = self.sym_types.get(ident)? else {
                    return None;
                };
                def.fields
                    .iter()
                    .find(|f| &f.name == field)
                    .map(|f| f.ty.clone())
            }
            Expr::Index { base, .. } => {
                let Expr::Name { ident, .. } = base.as_ref() else {
                    return None;
                };
                let Type::Array(def) = self.sym_types.get(ident)? else {
                    return None;
                };
                Some(def.elem.clone())
            }
            Expr::Cast { target, .. } => Some(target.clone()),
            Expr::AddressOf { target, .. } => match target.as_ref() {
                Expr::Field { base, field, .. } => {
                    let Expr::Name { ident, .. } = base.as_ref() else {
                        return None;
                    };
                    let Type::Struct(def) = self.sym_types.get(ident)? else {
                        return None;
                    };
                    def.fields
                        .iter()
                        .find(|f| &f.name == field)
                        .map(|f| addr_of(f.ty.clone()))
                }
                Expr::Name { ident, .. } => match self.sym_types.get(ident)? {
                    ty @ (Type::Struct(_) | Type::Array(_)) => Some(addr_of(ty.clone())),
                    _ => None,
                },
                _ => None,
            },
            Expr::Deref { addr, .. } => match self.expr_exact_type(addr)? {
                Type::Addr(pointee) => Some(*pointee),
                _ => None,
            },
            Expr::Call { callee, .. } => self.fn_sigs.get(callee)?.ret_ty.clone(),
            Expr::Int { .. } | Expr::Not { .. } | Expr::Binary { .. } => None,
        }
    }

    /// Unify the operand types of a comparison: both sides must be data,
    /// known types must agree exactly, and an unconstrained comparison
    /// defaults to u24.
    fn unify_compare_type(&self, lhs: &Expr, rhs: &Expr, pos: Pos) -> Result<Type> {
        let lt = self.expr_exact_type(lhs);
        let rt = self.expr_exact_type(rhs);
        if lt.as_ref().map_or(false, Type::is_addr_like)
            || rt.as_ref().map_or(false, Type::is_addr_like)
        {
            return Err(type_error(pos, "address comparison is not supported"));
        }
        match (lt, rt) {
            (Some(lt), Some(rt)) => {
                if lt != rt {
                    return Err(type_error(
                        pos,
                        "operands of a comparison must have the same data type; use casts",
                    ));
                }
                Ok(lt)
            }
            (Some(ty), None) | (None, Some(ty)) => Ok(ty),
            (None, None) => Ok(Type::U24),
        }
    }

    fn expr_reads_reg(&self, e: &Expr, reg: Reg) -> bool {
        match e {
            Expr::Name { ident, .. } => self.sym_regs.get(ident) == Some(&reg),
            Expr::Int { .. } => false,
            Expr::Field { base, .. } => self.expr_reads_reg(base, reg),
            Expr::Index { base, index, .. } => {
                self.expr_reads_reg(base, reg) || self.expr_reads_reg(index, reg)
            }
            Expr::AddressOf { target, .. } => self.expr_reads_reg(target, reg),
            Expr::Deref { addr, .. } => self.expr_reads_reg(addr, reg),
            Expr::Not { expr, .. } => self.expr_reads_reg(expr, reg),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr_reads_reg(lhs, reg) || self.expr_reads_reg(rhs, reg)
            }
            Expr::Call { args, .. } => args.iter().any(|a| self.expr_reads_reg(a, reg)),
            Expr::Cast { expr, .. } => self.expr_reads_reg(expr, reg),
        }
    }
}

impl Default for CodeGen {
    fn default() -> CodeGen {
        CodeGen::new()
    }
}

fn compound_mnemonic(op: AssignOp, signed: bool) -> &'static str {
    match op {
        AssignOp::Add => {
            if signed {
                "ADDSR"
            } else {
                "ADDUR"
            }
        }
        AssignOp::Sub => {
            if signed {
                "SUBSR"
            } else {
                "SUBUR"
            }
        }
        AssignOp::And => "ANDUR",
        AssignOp::Or => "ORUR",
        AssignOp::Xor => "XORUR",
        AssignOp::Shl => "SHLUR",
        AssignOp::Shr => {
            if signed {
                "SHRSR"
            } else {
                "SHRUR"
            }
        }
        AssignOp::Rol => "ROLUR",
        AssignOp::Ror => "RORUR",
        AssignOp::Set => unreachable!(),
    }
}

fn condition_code(op: BinOp, signed: bool) -> &'static str {
    match op {
        BinOp::Eq => "EQ",
        BinOp::Ne => "NE",
        BinOp::Lt => {
            if signed {
                "LT"
            } else {
                "BT"
            }
        }
        BinOp::Le => {
            if signed {
                "LE"
            } else {
                "BE"
            }
        }
        BinOp::Gt => {
            if signed {
                "GT"
            } else {
                "AT"
            }
        }
        BinOp::Ge => {
            if signed {
                "GE"
            } else {
                "AE"
            }
        }
        _ => unreachable!(),
    }
}

fn expr_contains_call(e: &Expr) -> bool {
    match e {
        Expr::Call { .. } => true,
        Expr::Int { .. } | Expr::Name { .. } => false,
        Expr::Field { base, .. } => expr_contains_call(base),
        Expr::Index { base, index, .. } => expr_contains_call(base) || expr_contains_call(index),
        Expr::AddressOf { target, .. } => expr_contains_call(target),
        Expr::Deref { addr, .. } => expr_contains_call(addr),
        Expr::Not { expr, .. } => expr_contains_call(expr),
        Expr::Binary { lhs, rhs, .. } => expr_contains_call(lhs) || expr_contains_call(rhs),
        Expr::Cast { expr, .. } => expr_contains_call(expr),
    }
}

/// Struct and array locals anywhere in the body (including nested blocks)
/// are frame-allocated up front.
fn collect_frame_locals(body: &[Stmt]) -> Vec<&VarDecl> {
    fn visit<'a>(stmt: &'a Stmt, out: &mut Vec<&'a VarDecl>) {
        match stmt {
            Stmt::Let(var) => {
                if matches!(var.ty, Type::Struct(_) | Type::Array(_)) && !var.is_global {
                    out.push(var);
                }
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                for s in then_body {
                    visit(s, out);
                }
                if let Some(else_body) = else_body {
                    for s in else_body {
                        visit(s, out);
                    }
                }
            }
            Stmt::While { body, .. } => {
                for s in body {
                    visit(s, out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    for stmt in body {
        visit(stmt, &mut out);
    }
    out
}

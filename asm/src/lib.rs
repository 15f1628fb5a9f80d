//! Two-pass assembler for the Amber 24-bit ISA.
//!
//! The main entry points are [`assemble`] and [`Assembler`], which turn
//! assembly text into a vector of 24-bit words; `imgfile` serializes those
//! words as `.bin` or `.hex`. Program counters count words, not bytes.
//!
//! # Source syntax
//!
//! Comments run from `;` to the end of the line. A line may start with a
//! `label:`, optionally followed by an instruction or directive. Mnemonics
//! and directives are case-insensitive; labels are case-sensitive.
//!
//! ## Directives
//!
//! Directive | Effect
//! ----------|-------
//! `.org N` | set the PC to word address `N`; pass 2 zero-pads any forward gap
//! `.equ NAME, EXPR` | bind `NAME`; forward references settle via fixed point
//! `.dw24 v1[, v2 ...]` / `.diad ...` | emit one evaluated word per argument
//! `.align N` | advance the PC to the next multiple of `N` (`N > 0`)
//! `.include PATH` | splice a file (quoted, angle-bracketed, or bare path)
//! `.macro NAME [p1[, p2 ...]]` .. `.endm` | define a macro; `{p}` substitutes
//! `.local n1[, n2 ...]` | inside a macro: make the names unique per expansion
//!
//! ## Expressions
//!
//! Immediate operands (optionally prefixed with `#`) are left-to-right
//! sums/differences of symbols and numeric literals (`0x`, `0b`, `0o`,
//! decimal). The literal `.` is the current PC. Values are range-checked
//! against the width of the destination field; signed fields store
//! two's-complement.
//!
//! ## Addressing-mode sugar
//!
//! `#imm(ARx)`, `ARx + imm`, and `PC + DRx` are rewritten to the canonical
//! operand order before encoding, and `CSRWR`/`CSRRD` accept the data
//! register on either side.
//!
//! ## Pseudo-instructions
//!
//! Pseudo | Expansion
//! -------|----------
//! `JCCui cc, target` / `JSRui target` / `SWIui target` | three `LUIui` bank loads plus the concrete control instruction (4 words)
//! `MULU24 a, b, lo, hi, tmp` (and the rest of the async-math family) | CSR operand writes, control kick, READY poll, result read(s)
//! `PACK_DIAD hi, lo, dst, tmp` / `UNPACK_DIAD src, hi, lo` | 12-bit lane masking and shifts
//! `DIAD_MOVUI dst, #hi12, #lo12` | build a 24-bit constant from two 12-bit halves
//!
//! Built-in symbols for the CSR indices and async-math control values
//! (`MATH_CTRL`, `MATH_OP_DIVU`, ...) are preloaded before pass 1.

mod assembler;
mod error;
mod expr;
mod include;
mod ir;
mod line;
mod macros;

#[cfg(test)]
mod test;

pub use crate::assembler::{assemble, Assembler};
pub use crate::error::{AsmError, AsmErrorKind, Result};
pub use crate::expr::resolve_expr;

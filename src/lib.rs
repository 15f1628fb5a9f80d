//! Amber ISA definition (assembler view).
//!
//! This crate is the single source of truth for how Amber instructions are
//! spelled and encoded: the 24-bit word model, register files and condition
//! codes, the data-driven [`spec::InstructionSet`] table mapping mnemonics to
//! bit-field layouts, and the built-in symbol table exposed to assembly
//! programs.
//!
//! Execution is out of scope here; the assembler (`amber-asm`) and the Skald
//! compiler (`skald`) build on top of this crate.

pub mod builtins;
pub mod constants;
pub mod enums;
pub mod spec;

/// A machine word. Amber words are 24 bits wide, kept in the low bits of a
/// `u32`; the top byte is always zero in encoded output.
pub type Word = u32;

/// Values carried in the assembler symbol table. Labels are word addresses;
/// `.equ` definitions may use up to 48 bits to hold combined-immediate
/// constants for the `LUIui` bank loads.
pub type LongWord = u64;

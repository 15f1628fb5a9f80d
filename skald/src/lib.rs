//! Skald: a small typed language that compiles to Amber assembly.
//!
//! The surface language has single-word data types (`u24`, `s24`), typed
//! two-word addresses (`addr<T>`), flat structs, one-dimensional arrays,
//! functions with optional register pins (`fn f(a: u24 in DR0) -> u24 out
//! DR0`), and the usual control flow (`if`/`else`, `while`, `break`,
//! `continue`, `return`). Typing is strict: no implicit conversion between
//! `u24` and `s24`, no arithmetic on addresses beyond `+=`/`-=` with a data
//! delta, and `cast_u24`/`cast_s24` reinterpret bits without conversion.
//! `get_addr` and `get_content` are the typed address-of and load-through
//! primitives.
//!
//! [`compile_text`] lowers a program to assembly text; [`compile_file`]
//! additionally writes the `.asm` and can run the assembler for a `.bin` or
//! `.hex` image.

pub mod ast;
mod codegen;
mod compiler;
mod error;
pub mod parser;
pub mod types;

#[cfg(test)]
mod test;

pub use crate::compiler::{compile_file, compile_text, CompileResult, OutputFormat};
pub use crate::error::{Error, Result};
pub use crate::parser::parse;

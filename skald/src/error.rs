use crate::ast::Pos;
use crate::parser::Rule;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Lexical and syntactic errors, straight from the grammar.
    #[error("{0}")]
    Parse(Box<pest::error::Error<Rule>>),
    /// Strict-typing violations.
    #[error("{pos}: type error: {msg}")]
    Type { msg: String, pos: Pos },
    /// Non-type code generation failures (unknown names, register
    /// exhaustion, unsupported constructs).
    #[error("{pos}: {msg}")]
    Codegen { msg: String, pos: Pos },
    /// Downstream assembler failure when `--assemble` is requested.
    #[error(transparent)]
    Asm(#[from] amber_asm::AsmError),
    #[error("failed to {action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(err: pest::error::Error<Rule>) -> Error {
        Error::Parse(Box::new(err))
    }
}

pub(crate) fn type_error(pos: Pos, msg: impl Into<String>) -> Error {
    Error::Type {
        msg: msg.into(),
        pos,
    }
}

pub(crate) fn codegen_error(pos: Pos, msg: impl Into<String>) -> Error {
    Error::Codegen {
        msg: msg.into(),
        pos,
    }
}

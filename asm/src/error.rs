use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AsmError>;

/// Assembler error kinds. Hard errors only; nothing is demoted to a warning.
#[derive(Debug, Error)]
pub enum AsmErrorKind {
    // Preprocessor
    #[error("include depth exceeded (possible include loop)")]
    IncludeLoop,
    #[error(".include requires a path argument")]
    IncludeMissingPath,
    #[error(".include has an unterminated path argument")]
    IncludeUnterminatedPath,
    #[error("failed to read include '{}': {source}", .path.display())]
    IncludeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read source '{}': {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("macro expansion depth exceeded (possible recursive macro)")]
    MacroDepth,
    #[error(".macro is missing a name")]
    MacroMissingName,
    #[error("invalid macro name '{0}'")]
    MacroInvalidName(String),
    #[error(".macro '{0}' is missing its .endm")]
    MacroMissingEnd(String),
    #[error("redefinition of macro '{0}'")]
    MacroRedefined(String),
    #[error("macro {name} expects {expected} argument(s), got {got}")]
    MacroArgCount {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("unknown macro parameter '{{{param}}}' in {name}")]
    MacroUnknownParam { name: String, param: String },

    // Symbols
    #[error("duplicate label '{0}'")]
    DuplicateLabel(String),
    #[error("redefinition of symbol '{0}' in .equ")]
    DuplicateEqu(String),
    #[error("unresolved .equ forward references: {0}")]
    UnresolvedEqu(String),

    // Expressions
    #[error("unknown symbol '{0}' in expression")]
    UnknownSymbol(String),
    #[error("invalid number '{0}'")]
    MalformedNumber(String),
    #[error("signed immediate out of range {min}..{max}: {value} in '{token}'")]
    SignedImmediateRange {
        token: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("immediate out of range 0..{max}: {value} in '{token}'")]
    UnsignedImmediateRange { token: String, value: i64, max: i64 },

    // Directives
    #[error(".org requires a numeric address")]
    OrgMissingAddress,
    #[error(".equ requires NAME, EXPR")]
    EquArgCount,
    #[error("invalid symbol name in .equ: '{0}'")]
    EquInvalidName(String),
    #[error(".align requires a positive alignment")]
    AlignNonPositive,
    #[error("unknown directive '.{0}'")]
    UnknownDirective(String),

    // Encoding
    #[error(transparent)]
    Encode(#[from] amber::spec::EncodeError),
    #[error("unknown or unsupported mnemonic '{0}'")]
    UnknownMnemonic(String),
    #[error("{pseudo} expects {expected} operand(s), got {got}")]
    PseudoOperandCount {
        pseudo: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("missing spec for '{0}' while expanding a pseudo-instruction")]
    MissingSpec(&'static str),
}

/// A hard assembler error carrying the originating source line. For content
/// produced by the preprocessor, `line_no` counts lines of the expanded
/// stream; the include trail is visible in the stream's delimiter comments.
#[derive(Debug)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    pub line_no: usize,
    pub line: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, line_no: usize, line: &str) -> AsmError {
        AsmError {
            kind,
            line_no,
            line: line.to_string(),
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line_no == 0 {
            return write!(f, "{}", self.kind);
        }
        write!(f, "line {}: {}", self.line_no, self.kind)?;
        if !self.line.trim().is_empty() {
            write!(f, "\n    {}", self.line.trim_end())?;
        }
        Ok(())
    }
}

impl std::error::Error for AsmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Attach line context to a kind-level result.
pub(crate) trait AtLine<T> {
    fn at_line(self, line_no: usize, line: &str) -> Result<T>;
}

impl<T> AtLine<T> for std::result::Result<T, AsmErrorKind> {
    fn at_line(self, line_no: usize, line: &str) -> Result<T> {
        self.map_err(|kind| AsmError::new(kind, line_no, line))
    }
}

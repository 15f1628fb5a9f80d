use std::{error::Error, fmt};

pub type Endian = byteorder::LittleEndian;

/// Error produced when a token does not name any variant of an enum.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl ParseEnumError {
    pub fn new(value: &str, enum_name: &'static str) -> ParseEnumError {
        ParseEnumError {
            value: value.to_string(),
            enum_name,
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected {}, got '{}'", &self.enum_name, &self.value)
    }
}

impl Error for ParseEnumError {}

/// Case-insensitive enum-from-token parsing; derived by `util-derive`.
///
/// The derive matches the uppercased variant name, plus any
/// `#[from_str(alias = "...")]` names declared on a variant.
pub trait EnumFromStr: Sized {
    fn from_str(s: &str) -> Result<Self, ParseEnumError>;
}

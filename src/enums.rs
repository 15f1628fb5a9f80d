use crate::constants;
use util::{EnumFromStr, ParseEnumError};
use util_derive::EnumFromStr;

/// Condition codes, 4 bits, fixed encoding (`RA` has the alias `AL`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumFromStr)]
pub enum Cond {
    #[from_str(alias = "AL")]
    Ra = 0x0,
    Eq = 0x1,
    Ne = 0x2,
    Lt = 0x3,
    Gt = 0x4,
    Le = 0x5,
    Ge = 0x6,
    Bt = 0x7,
    At = 0x8,
    Be = 0x9,
    Ae = 0xA,
}

/// Status registers. The variant names are the architectural aliases; the
/// numeric spellings `SR0`..`SR3` are accepted by [`parse_sr`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumFromStr)]
pub enum StatusReg {
    Lr = 0,
    Ssp = 1,
    Fl = 2,
    Pc = 3,
}

/// Hi/lo half selector on the 48-bit address-register move forms.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumFromStr)]
pub enum HalfSel {
    #[from_str(alias = "LO", alias = "LOW")]
    L = 0,
    #[from_str(alias = "HI", alias = "HIGH")]
    H = 1,
}

fn numbered_register(token: &str, prefix: &str, count: u32) -> Option<u32> {
    let t = token.trim().to_ascii_uppercase();
    let idx = t.strip_prefix(prefix)?.parse::<u32>().ok()?;
    if idx < count {
        Some(idx)
    } else {
        None
    }
}

/// Accepts an optional parenthesized spelling: `(AR0)` for `AR0`.
fn strip_parens(token: &str) -> &str {
    let t = token.trim();
    match t.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => inner.trim(),
        None => t,
    }
}

/// Parse a data register `DR0`..`DR15`.
pub fn parse_dr(token: &str) -> Result<u32, ParseEnumError> {
    numbered_register(token, "DR", constants::DR_COUNT)
        .ok_or_else(|| ParseEnumError::new(token, "data register DR0..DR15"))
}

/// Parse an address register `AR0`..`AR3`, parentheses tolerated.
pub fn parse_ar(token: &str) -> Result<u32, ParseEnumError> {
    numbered_register(strip_parens(token), "AR", constants::AR_COUNT)
        .ok_or_else(|| ParseEnumError::new(token, "address register AR0..AR3"))
}

/// Parse a status register: `SR0`..`SR3` or an alias (`LR`, `SSP`, `FL`,
/// `PC`), parentheses tolerated.
pub fn parse_sr(token: &str) -> Result<u32, ParseEnumError> {
    let t = strip_parens(token);
    if let Ok(alias) = StatusReg::from_str(t) {
        return Ok(alias as u32);
    }
    numbered_register(t, "SR", constants::SR_COUNT)
        .ok_or_else(|| ParseEnumError::new(token, "status register SR0..SR3"))
}

/// Parse a condition code token.
pub fn parse_cc(token: &str) -> Result<u32, ParseEnumError> {
    Cond::from_str(token.trim()).map(|cc| cc as u32)
}

/// Parse a hi/lo half selector token.
pub fn parse_hl(token: &str) -> Result<u32, ParseEnumError> {
    HalfSel::from_str(token.trim()).map(|hl| hl as u32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn condition_codes_and_aliases() {
        assert_eq!(parse_cc("EQ").unwrap(), 0x1);
        assert_eq!(parse_cc("ra").unwrap(), 0x0);
        assert_eq!(parse_cc("AL").unwrap(), 0x0);
        assert_eq!(parse_cc("AE").unwrap(), 0xA);
        assert!(parse_cc("XX").is_err());
    }

    #[test]
    fn data_registers() {
        assert_eq!(parse_dr("DR0").unwrap(), 0);
        assert_eq!(parse_dr("dr15").unwrap(), 15);
        assert!(parse_dr("DR16").is_err());
        assert!(parse_dr("AR1").is_err());
    }

    #[test]
    fn address_registers_tolerate_parens() {
        assert_eq!(parse_ar("AR2").unwrap(), 2);
        assert_eq!(parse_ar("(AR3)").unwrap(), 3);
        assert!(parse_ar("AR4").is_err());
    }

    #[test]
    fn status_register_aliases() {
        assert_eq!(parse_sr("LR").unwrap(), 0);
        assert_eq!(parse_sr("SSP").unwrap(), 1);
        assert_eq!(parse_sr("FL").unwrap(), 2);
        assert_eq!(parse_sr("PC").unwrap(), 3);
        assert_eq!(parse_sr("SR2").unwrap(), 2);
        assert_eq!(parse_sr("(PC)").unwrap(), 3);
    }

    #[test]
    fn half_selector_spellings() {
        assert_eq!(parse_hl("L").unwrap(), 0);
        assert_eq!(parse_hl("low").unwrap(), 0);
        assert_eq!(parse_hl("H").unwrap(), 1);
        assert_eq!(parse_hl("HIGH").unwrap(), 1);
        assert!(parse_hl("M").is_err());
    }
}

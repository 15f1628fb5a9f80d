//! Immediate expression evaluation.
//!
//! An expression is a left-to-right sum/difference of terms; each term is a
//! bound symbol or a numeric literal (`0x`/`0b`/`0o` prefixes or decimal).
//! The literal `.` denotes the current PC as a word address. The result is
//! range-checked against the target field width and, for signed fields,
//! stored two's-complement.

use crate::error::AsmErrorKind;
use num_traits::PrimInt;
use std::collections::HashMap;

/// Radix-aware unsigned integer parsing; tolerates a leading `#`.
pub(crate) fn parse_uint<T: PrimInt>(token: &str) -> Option<T> {
    let t = token.trim();
    let t = t.strip_prefix('#').unwrap_or(t).trim();
    let (digits, radix) = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        (bin, 2)
    } else if let Some(oct) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        (oct, 8)
    } else {
        (t, 10)
    };
    T::from_str_radix(digits, radix).ok()
}

/// Evaluate an immediate expression. Pure in all of its inputs.
pub fn resolve_expr(
    token: &str,
    symbols: &HashMap<String, i64>,
    width: u8,
    signed: bool,
    pc: u32,
    pc_relative: bool,
) -> Result<u64, AsmErrorKind> {
    let t = token.trim();
    let t = t.strip_prefix('#').unwrap_or(t).trim();
    // '.' stands for the current PC (word address).
    let t = t.replace('.', &pc.to_string());

    let mut total: i64 = 0;
    let mut sign: i64 = 1;
    let mut term = String::new();

    fn flush(
        term: &mut String,
        sign: i64,
        total: &mut i64,
        symbols: &HashMap<String, i64>,
    ) -> Result<(), AsmErrorKind> {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            term.clear();
            return Ok(());
        }
        let value = if let Some(bound) = symbols.get(trimmed) {
            *bound
        } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            parse_uint::<i64>(trimmed)
                .ok_or_else(|| AsmErrorKind::MalformedNumber(trimmed.to_string()))?
        } else {
            return Err(AsmErrorKind::UnknownSymbol(trimmed.to_string()));
        };
        *total += sign * value;
        term.clear();
        Ok(())
    }

    for ch in t.chars() {
        if ch == '+' || ch == '-' {
            flush(&mut term, sign, &mut total, symbols)?;
            sign = if ch == '+' { 1 } else { -1 };
        } else {
            term.push(ch);
        }
    }
    flush(&mut term, sign, &mut total, symbols)?;

    if pc_relative {
        total -= pc as i64;
    }

    if signed {
        let min = -(1i64 << (width - 1));
        let max = (1i64 << (width - 1)) - 1;
        if total < min || total > max {
            return Err(AsmErrorKind::SignedImmediateRange {
                token: token.to_string(),
                value: total,
                min,
                max,
            });
        }
        Ok((total as u64) & ((1u64 << width) - 1))
    } else {
        let max = (1i64 << width) - 1;
        if total < 0 || total > max {
            return Err(AsmErrorKind::UnsignedImmediateRange {
                token: token.to_string(),
                value: total,
                max,
            });
        }
        Ok(total as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn symbols(entries: &[(&str, i64)]) -> HashMap<String, i64> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn radix_prefixes() {
        let syms = HashMap::new();
        assert_eq!(resolve_expr("#0x10", &syms, 24, false, 0, false).unwrap(), 16);
        assert_eq!(resolve_expr("0b101", &syms, 24, false, 0, false).unwrap(), 5);
        assert_eq!(resolve_expr("0o17", &syms, 24, false, 0, false).unwrap(), 15);
        assert_eq!(resolve_expr("42", &syms, 24, false, 0, false).unwrap(), 42);
    }

    #[test]
    fn sums_and_differences() {
        let syms = symbols(&[("BASE", 0x100), ("OFF", 4)]);
        assert_eq!(
            resolve_expr("BASE + OFF - 1", &syms, 24, false, 0, false).unwrap(),
            0x103
        );
    }

    #[test]
    fn dot_is_the_current_pc() {
        let syms = HashMap::new();
        assert_eq!(resolve_expr(".", &syms, 24, false, 7, false).unwrap(), 7);
        assert_eq!(
            resolve_expr(".-2", &syms, 12, true, 7, true).unwrap(),
            0xFFE
        );
    }

    #[test]
    fn pc_relative_subtracts_the_pc() {
        let syms = symbols(&[("L", 0x100)]);
        assert_eq!(
            resolve_expr("L", &syms, 12, true, 0xF0, true).unwrap(),
            0x010
        );
        assert_eq!(
            resolve_expr("L", &syms, 12, true, 0x110, true).unwrap(),
            0xFF0
        );
    }

    #[test]
    fn signed_range_checks() {
        let syms = HashMap::new();
        assert_eq!(resolve_expr("#-1", &syms, 12, true, 0, false).unwrap(), 0xFFF);
        assert!(matches!(
            resolve_expr("#2048", &syms, 12, true, 0, false),
            Err(AsmErrorKind::SignedImmediateRange { .. })
        ));
        assert!(matches!(
            resolve_expr("#-2049", &syms, 12, true, 0, false),
            Err(AsmErrorKind::SignedImmediateRange { .. })
        ));
    }

    #[test]
    fn unsigned_range_checks() {
        let syms = HashMap::new();
        assert_eq!(
            resolve_expr("#0xFFF", &syms, 12, false, 0, false).unwrap(),
            0xFFF
        );
        assert!(matches!(
            resolve_expr("#0x1000", &syms, 12, false, 0, false),
            Err(AsmErrorKind::UnsignedImmediateRange { .. })
        ));
        assert!(matches!(
            resolve_expr("#0-1", &syms, 12, false, 0, false),
            Err(AsmErrorKind::UnsignedImmediateRange { .. })
        ));
    }

    #[test]
    fn distinct_errors_for_symbols_and_numbers() {
        let syms = HashMap::new();
        assert!(matches!(
            resolve_expr("nosuch", &syms, 24, false, 0, false),
            Err(AsmErrorKind::UnknownSymbol(_))
        ));
        assert!(matches!(
            resolve_expr("0xZZ", &syms, 24, false, 0, false),
            Err(AsmErrorKind::MalformedNumber(_))
        ));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let syms = symbols(&[("A", 10)]);
        let first = resolve_expr("A + 2", &syms, 24, false, 5, false).unwrap();
        let second = resolve_expr("A + 2", &syms, 24, false, 5, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn wide_equ_values() {
        let syms = HashMap::new();
        assert_eq!(
            resolve_expr("0x1234567890AB", &syms, 48, false, 0, false).unwrap(),
            0x1234_5678_90AB
        );
    }
}

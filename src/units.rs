// src/units.rs

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size: '{0}'")]
pub struct SizeParseError(pub String);

const DECIMAL_PREFIXES: [(char, u64); 5] = [
    ('k', 1_000),
    ('m', 1_000_000),
    ('g', 1_000_000_000),
    ('t', 1_000_000_000_000),
    ('p', 1_000_000_000_000_000),
];

/// Parse a human-readable size such as `"10MB"`, `"1.5 gb"` or `"512k"`.
///
/// Multipliers are decimal: `KB` and `KiB` both mean 1000 bytes. A bare
/// number is a byte count.
pub fn parse_human_size(s: &str) -> Result<u64, SizeParseError> {
    let invalid = || SizeParseError(s.to_string());

    let digits_end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, rest) = s.split_at(digits_end);
    if number.is_empty() || !number.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;

    let mut suffix = rest.strip_prefix(' ').unwrap_or(rest).to_ascii_lowercase();
    if suffix.ends_with('b') {
        suffix.pop();
    }
    if suffix.ends_with('i') {
        suffix.pop();
    }
    let multiplier = match suffix.as_str() {
        "" => 1,
        unit => {
            let mut chars = unit.chars();
            let (Some(prefix), None) = (chars.next(), chars.next()) else {
                return Err(invalid());
            };
            DECIMAL_PREFIXES
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, m)| *m)
                .ok_or_else(invalid)?
        }
    };

    Ok((value * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_units() {
        assert_eq!(parse_human_size("10MB"), Ok(10_000_000));
        assert_eq!(parse_human_size("1mb"), Ok(1_000_000));
        assert_eq!(parse_human_size("512k"), Ok(512_000));
        assert_eq!(parse_human_size("2 GiB"), Ok(2_000_000_000));
        assert_eq!(parse_human_size("1.5KB"), Ok(1_500));
        assert_eq!(parse_human_size("1T"), Ok(1_000_000_000_000));
    }

    #[test]
    fn bare_numbers_are_bytes() {
        assert_eq!(parse_human_size("4096"), Ok(4096));
        assert_eq!(parse_human_size("32b"), Ok(32));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "MB", "-1MB", "10XB", "10 MBB", "1.2.3k", "10  MB", " 10MB", ".5k"] {
            assert!(parse_human_size(bad).is_err(), "accepted {bad:?}");
        }
    }
}

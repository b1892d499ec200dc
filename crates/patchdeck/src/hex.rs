//! Hex string parsing for catalog definitions.

use crate::error::{Error, Result};

/// Parse a hex address string (with or without 0x prefix).
///
/// # Examples
///
/// ```
/// use patchdeck::hex::parse_hex_address;
///
/// assert_eq!(parse_hex_address("0x1000").unwrap(), 0x1000);
/// assert_eq!(parse_hex_address("1000").unwrap(), 0x1000);
/// ```
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(Error::InvalidHex(format!("empty address '{}'", s)));
    }
    if !is_hex_digits(digits.as_bytes()) {
        return Err(Error::InvalidHex(format!("invalid address '{}'", s)));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::InvalidHex(format!("invalid address '{}': {}", s, e)))
}

/// Parse a byte string such as `"90 90 E9"` or `"9090E9"`.
///
/// Whitespace between bytes is optional; each byte needs both digits.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(Error::InvalidHex(format!("odd number of digits in '{}'", s)));
    }

    digits
        .chunks(2)
        .map(|pair| {
            if !is_hex_digits(pair) {
                return Err(Error::InvalidHex(format!(
                    "invalid byte '{}' in '{}'",
                    String::from_utf8_lossy(pair),
                    s
                )));
            }
            Ok((hex_value(pair[0]) << 4) | hex_value(pair[1]))
        })
        .collect()
}

/// Parse whitespace separated tokens where `?` or `??` stands for "any byte".
pub fn parse_wildcard_bytes(s: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in s.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        if token.len() > 2 || !is_hex_digits(token.as_bytes()) {
            return Err(Error::InvalidHex(format!("invalid token '{}'", token)));
        }
        let value = token
            .bytes()
            .fold(0u8, |acc, digit| (acc << 4) | hex_value(digit));
        bytes.push(Some(value));
    }
    Ok(bytes)
}

fn is_hex_digits(digits: &[u8]) -> bool {
    !digits.is_empty() && digits.iter().all(u8::is_ascii_hexdigit)
}

/// Value of one ASCII hex digit; callers check with [`is_hex_digits`] first.
fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Format bytes as space separated upper-case hex.
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

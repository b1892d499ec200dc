//! Wildcard byte signatures.
//!
//! A [`BytePattern`] is a sequence of bytes where each position is either
//! fixed or a wildcard. Patterns are written IDA-style (`"48 8B ?? 05"`) in
//! catalogs, or as a byte slice plus a code-style mask (`"xx?x"`).

mod scanner;

use std::fmt;

use crate::error::{Error, Result};
use crate::hex::parse_wildcard_bytes;

pub use scanner::{SCAN_CHUNK_SIZE, scan_module, scan_module_chunked};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<u8>,
    /// `true` where the byte must match
    mask: Vec<bool>,
    /// Index of the first fixed byte, used to find candidates with memchr
    anchor: usize,
}

impl BytePattern {
    /// Build a pattern from parallel byte and mask sequences.
    pub fn new(bytes: Vec<u8>, mask: Vec<bool>) -> Result<Self> {
        if bytes.len() != mask.len() {
            return Err(Error::InvalidPattern(format!(
                "{} bytes but {} mask entries",
                bytes.len(),
                mask.len()
            )));
        }
        if bytes.is_empty() {
            return Err(Error::InvalidPattern("pattern is empty".to_string()));
        }
        let anchor = mask.iter().position(|&fixed| fixed).ok_or_else(|| {
            Error::InvalidPattern("pattern has no fixed bytes".to_string())
        })?;

        Ok(Self {
            bytes,
            mask,
            anchor,
        })
    }

    /// Parse `"48 8D 0D ?? ?? ?? ??"`; `?` and `??` are wildcards.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = parse_wildcard_bytes(text)?;
        Self::from_tokens(&tokens)
    }

    pub fn from_tokens(tokens: &[Option<u8>]) -> Result<Self> {
        let bytes = tokens.iter().map(|b| b.unwrap_or(0)).collect();
        let mask = tokens.iter().map(Option::is_some).collect();
        Self::new(bytes, mask)
    }

    /// Build from a byte slice and a mask string of `x` (fixed) and `?` (wildcard).
    pub fn from_code_style(bytes: &[u8], mask: &str) -> Result<Self> {
        let mask = mask
            .chars()
            .map(|c| match c {
                'x' | 'X' => Ok(true),
                '?' => Ok(false),
                other => Err(Error::InvalidPattern(format!(
                    "invalid mask character '{}'",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(bytes.to_vec(), mask)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Check a window of exactly `self.len()` bytes.
    pub fn matches_at(&self, window: &[u8]) -> bool {
        window.len() == self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(&self.mask)
                .zip(window)
                .all(|((expected, fixed), actual)| !fixed || expected == actual)
    }

    /// Lazily yield `base + offset` for every match inside `haystack`.
    pub fn matches<'a>(&'a self, haystack: &'a [u8], base: u64) -> Matches<'a> {
        Matches {
            pattern: self,
            haystack,
            base,
            position: 0,
        }
    }

    /// First match inside `haystack`, as an offset.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        self.matches(haystack, 0).next().map(|addr| addr as usize)
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (byte, fixed)) in self.bytes.iter().zip(&self.mask).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if *fixed {
                write!(f, "{:02X}", byte)?;
            } else {
                f.write_str("??")?;
            }
        }
        Ok(())
    }
}

/// Iterator over match addresses, created by [`BytePattern::matches`].
#[derive(Debug, Clone)]
pub struct Matches<'a> {
    pattern: &'a BytePattern,
    haystack: &'a [u8],
    base: u64,
    /// Next candidate start offset
    position: usize,
}

impl Iterator for Matches<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let len = self.pattern.len();
        if self.haystack.len() < len {
            return None;
        }
        let last = self.haystack.len() - len;
        let anchor = self.pattern.anchor;
        let anchor_byte = self.pattern.bytes[anchor];

        while self.position <= last {
            let window = &self.haystack[self.position + anchor..=last + anchor];
            let start = self.position + memchr::memchr(anchor_byte, window)?;
            self.position = start + 1;

            if self.pattern.matches_at(&self.haystack[start..start + len]) {
                return Some(self.base + start as u64);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_match_at_start() {
        let buffer = [0xAA, 0xBB, 0xCC, 0xDD];
        let pattern = BytePattern::from_code_style(&[0xAA, 0x00, 0xCC, 0xDD], "x?xx").unwrap();
        let found: Vec<u64> = pattern.matches(&buffer, 0).collect();
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_fixed_mismatch_matches_nowhere() {
        let buffer = [0xAA, 0xBB, 0xCC, 0xDD];
        let pattern = BytePattern::parse("AA BB CC EE").unwrap();
        assert_eq!(pattern.matches(&buffer, 0).count(), 0);
    }

    #[test]
    fn test_matches_are_absolute_and_overlapping() {
        let buffer = [0x90, 0x90, 0x90, 0x00];
        let pattern = BytePattern::parse("90 90").unwrap();
        let found: Vec<u64> = pattern.matches(&buffer, 0x1000).collect();
        assert_eq!(found, vec![0x1000, 0x1001]);
    }

    #[test]
    fn test_leading_wildcard_does_not_read_past_end() {
        let buffer = [0x01, 0xE8, 0x02, 0xE8];
        let pattern = BytePattern::parse("?? E8 ??").unwrap();
        let found: Vec<u64> = pattern.matches(&buffer, 0).collect();
        // The trailing E8 at offset 3 has no room for the last wildcard
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_pattern_longer_than_buffer() {
        let pattern = BytePattern::parse("01 02 03").unwrap();
        assert_eq!(pattern.find(&[0x01, 0x02]), None);
    }

    #[test]
    fn test_rejects_degenerate_patterns() {
        assert!(BytePattern::parse("").is_err());
        assert!(BytePattern::parse("?? ??").is_err());
        assert!(BytePattern::from_code_style(&[0x01, 0x02], "x").is_err());
        assert!(BytePattern::from_code_style(&[0x01], "z").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let pattern = BytePattern::parse("48 8d ? 05").unwrap();
        assert_eq!(pattern.to_string(), "48 8D ?? 05");
        assert_eq!(BytePattern::parse(&pattern.to_string()).unwrap(), pattern);
    }
}

//! Byte patterns and per-symbol signatures.
//!
//! A [`BytePattern`] is a byte string with a wildcard mask. Patterns are written either in the
//! common IDA notation (`"48 8B 05 ?? ?? ?? ?? C3"`, one `?` or `??` per wildcard byte) or as raw
//! bytes plus an `x`/`?` mask string. A [`SymbolSignature`] bundles everything the resolver knows
//! about one runtime symbol.

use std::fmt;

use crate::{Error::InvalidArgument, Result};

/// A byte sequence with per-byte wildcards.
#[derive(Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<u8>,
    mask: Vec<bool>,
}

impl BytePattern {
    /// Parses an IDA-style pattern.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for empty patterns or tokens that are neither
    /// wildcards nor two-digit hex bytes.
    pub fn parse_ida(pattern: &str) -> Result<BytePattern> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();

        for token in pattern.split_whitespace() {
            if token == "?" || token == "??" {
                bytes.push(0);
                mask.push(false);
                continue;
            }

            if token.len() != 2 {
                return Err(InvalidArgument(format!(
                    "invalid pattern token '{}' in '{}'",
                    token, pattern
                )));
            }
            let byte = u8::from_str_radix(token, 16).map_err(|_| {
                InvalidArgument(format!("invalid pattern token '{}' in '{}'", token, pattern))
            })?;
            bytes.push(byte);
            mask.push(true);
        }

        Self::checked(bytes, mask)
    }

    /// Builds a pattern from raw bytes and an `x` (match) / `?` (wildcard) mask.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if the lengths differ or the mask contains
    /// other characters.
    pub fn from_mask(bytes: &[u8], mask: &str) -> Result<BytePattern> {
        if bytes.len() != mask.len() {
            return Err(InvalidArgument(format!(
                "pattern has {} bytes but a mask of {}",
                bytes.len(),
                mask.len()
            )));
        }

        let mask = mask
            .chars()
            .map(|c| match c {
                'x' => Ok(true),
                '?' => Ok(false),
                other => Err(InvalidArgument(format!("invalid mask character '{}'", other))),
            })
            .collect::<Result<Vec<bool>>>()?;

        Self::checked(bytes.to_vec(), mask)
    }

    /// Builds a pattern that matches `bytes` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `bytes` is empty.
    pub fn exact(bytes: &[u8]) -> Result<BytePattern> {
        Self::checked(bytes.to_vec(), vec![true; bytes.len()])
    }

    fn checked(bytes: Vec<u8>, mask: Vec<bool>) -> Result<BytePattern> {
        if bytes.is_empty() {
            return Err(InvalidArgument("empty pattern".to_string()));
        }
        if !mask.iter().any(|m| *m) {
            return Err(InvalidArgument(
                "pattern consists only of wildcards".to_string(),
            ));
        }

        Ok(BytePattern { bytes, mask })
    }

    /// Number of bytes covered by the pattern.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; empty patterns are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns `true` if the pattern matches `window` at its start.
    #[must_use]
    pub fn matches(&self, window: &[u8]) -> bool {
        window.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(&self.mask)
                .zip(window)
                .all(|((expected, significant), actual)| !significant || expected == actual)
    }

    /// Offset of the first significant byte, used to skip ahead during scanning.
    pub(crate) fn anchor(&self) -> (usize, u8) {
        let index = self.mask.iter().position(|m| *m).unwrap_or(0);
        (index, self.bytes[index])
    }
}

impl fmt::Debug for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BytePattern(\"{}\")", self)
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (byte, significant)) in self.bytes.iter().zip(&self.mask).enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            if *significant {
                write!(f, "{:02X}", byte)?;
            } else {
                f.write_str("??")?;
            }
        }
        Ok(())
    }
}

/// Everything known about how to locate one runtime symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSignature {
    /// Canonical export name
    pub name: String,
    /// Known obfuscated name suffixes
    pub suffixes: Vec<String>,
    /// Code patterns, tried in order
    pub patterns: Vec<BytePattern>,
}

impl SymbolSignature {
    /// Creates a signature that can only be resolved by name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        SymbolSignature {
            name: name.to_string(),
            suffixes: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Adds known obfuscated suffixes.
    #[must_use]
    pub fn with_suffixes(mut self, suffixes: &[&str]) -> Self {
        self.suffixes
            .extend(suffixes.iter().map(|suffix| (*suffix).to_string()));
        self
    }

    /// Adds a byte pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: BytePattern) -> Self {
        self.patterns.push(pattern);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ida_patterns() {
        let pattern = BytePattern::parse_ida("48 8B 05 ?? ?? ?? ?? C3").unwrap();
        assert_eq!(pattern.len(), 8);
        assert!(pattern.matches(&[0x48, 0x8B, 0x05, 1, 2, 3, 4, 0xC3]));
        assert!(!pattern.matches(&[0x48, 0x8B, 0x05, 1, 2, 3, 4, 0xC2]));
        assert!(!pattern.matches(&[0x48, 0x8B, 0x05]));

        let single = BytePattern::parse_ida("48 89 5C 24 ? 57").unwrap();
        assert_eq!(single.to_string(), "48 89 5C 24 ?? 57");
        assert_eq!(single.anchor(), (0, 0x48));
    }

    #[test]
    fn parse_ida_rejects_garbage() {
        assert!(BytePattern::parse_ida("").is_err());
        assert!(BytePattern::parse_ida("?? ??").is_err());
        assert!(BytePattern::parse_ida("48 ZZ").is_err());
        assert!(BytePattern::parse_ida("488B").is_err());
    }

    #[test]
    fn mask_patterns() {
        let pattern = BytePattern::from_mask(&[0x8B, 0x41, 0x00, 0xC3], "xx?x").unwrap();
        assert!(pattern.matches(&[0x8B, 0x41, 0x7F, 0xC3]));
        assert_eq!(pattern, BytePattern::parse_ida("8B 41 ? C3").unwrap());

        assert!(BytePattern::from_mask(&[0x8B], "xx").is_err());
        assert!(BytePattern::from_mask(&[0x8B], "y").is_err());
    }

    #[test]
    fn wildcard_anchor_skips_leading_wildcards() {
        let pattern = BytePattern::parse_ida("?? ?? E8").unwrap();
        assert_eq!(pattern.anchor(), (2, 0xE8));
    }
}

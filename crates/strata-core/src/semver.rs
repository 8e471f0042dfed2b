//! Lenient semantic versions as reported by live backends.
//!
//! Servers report versions such as `3.3.2`, `v5.12`, `4_4_0` or
//! `7.10.2-SNAPSHOT`. Parsing keeps the leading numeric part of each
//! component, ignores trailing qualifiers and treats missing components as
//! zero, so `3.3` and `3.3.0` compare equal.

use crate::error::{DaoError, ErrorKey, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Version {
    /// Numeric components with trailing zeros trimmed
    parts: Vec<u64>,
    raw: String,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let mut parts = Vec::new();
        for component in body.split(['.', '_']) {
            let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            let value = digits.parse::<u64>().map_err(|_| invalid_version(input))?;
            parts.push(value);
            if digits.len() != component.len() {
                // a qualifier such as "-rc1" ends the numeric part
                break;
            }
        }

        if parts.is_empty() {
            return Err(invalid_version(input));
        }
        while parts.last() == Some(&0) {
            parts.pop();
        }

        Ok(Self {
            parts,
            raw: trimmed.to_string(),
        })
    }

    /// Component at `index`, zero when absent
    pub fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }

    pub fn major(&self) -> u64 {
        self.component(0)
    }

    pub fn minor(&self) -> u64 {
        self.component(1)
    }

    pub fn patch(&self) -> u64 {
        self.component(2)
    }

    /// The string this version was parsed from
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn invalid_version(input: &str) -> DaoError {
    DaoError::technical(
        ErrorKey::UnexpectedResponse,
        format!("\"{input}\" is not a valid version"),
    )
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // trailing zeros are trimmed, so a strict prefix is always smaller
        self.parts.cmp(&other.parts)
    }
}

impl FromStr for Version {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(v("3.3.2").major(), 3);
        assert_eq!(v("v5.12").minor(), 12);
        assert_eq!(v("4_4_1").patch(), 1);
        assert_eq!(v("7.10.2-SNAPSHOT").patch(), 2);
        assert_eq!(v("3.5.0-rc1").minor(), 5);
        assert_eq!(v(" 2.1.5 ").as_str(), "2.1.5");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("latest").is_err());
        let err = Version::parse("abc").unwrap_err();
        assert_eq!(err.key(), ErrorKey::UnexpectedResponse);
    }

    #[test]
    fn test_missing_parts_are_zero() {
        assert_eq!(v("3.3"), v("3.3.0"));
        assert_eq!(v("3"), v("3.0.0.0"));
        assert!(v("3.0.1") > v("3"));
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert!(v("3.10.0") > v("3.9.9"));
        assert!(v("10.0") > v("9.99"));
        assert!(v("2.1.5") < v("3.0.0"));
    }
}

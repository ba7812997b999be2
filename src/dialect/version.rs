use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::core::{PersistError, Result};

lazy_static::lazy_static! {
    static ref VERSION_PATTERN: Regex =
        Regex::new(r"^\s*(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("version pattern compiles");
}

/// Database server version used to gate dialect capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatabaseVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl DatabaseVersion {
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    pub const fn make(major: u32, minor: u32) -> Self {
        Self::new(major, minor, 0)
    }

    /// Parses `"15"`, `"12.10"` or `"8.0.33"`; trailing vendor suffixes
    /// (`"12.10.FC4"`, `"15.4 (Debian)"`) are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let captures = VERSION_PATTERN.captures(text).ok_or_else(|| {
            PersistError::Configuration(format!("Invalid database version '{}'", text))
        })?;
        let part = |idx: usize| -> Result<u32> {
            captures
                .get(idx)
                .map(|m| m.as_str().parse::<u32>())
                .transpose()
                .map(|v| v.unwrap_or(0))
                .map_err(|e| {
                    PersistError::Configuration(format!(
                        "Invalid database version '{}': {}",
                        text, e
                    ))
                })
        };
        Ok(Self::new(part(1)?, part(2)?, part(3)?))
    }

    pub fn is_same_or_after(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    pub fn is_before(&self, major: u32, minor: u32) -> bool {
        !self.is_same_or_after(major, minor)
    }
}

impl PartialOrd for DatabaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DatabaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro).cmp(&(other.major, other.minor, other.micro))
    }
}

impl fmt::Display for DatabaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(DatabaseVersion::parse("15").unwrap(), DatabaseVersion::make(15, 0));
        assert_eq!(
            DatabaseVersion::parse("12.10.FC4").unwrap(),
            DatabaseVersion::make(12, 10)
        );
        assert_eq!(
            DatabaseVersion::parse("8.0.33").unwrap(),
            DatabaseVersion::new(8, 0, 33)
        );
        assert!(DatabaseVersion::parse("latest").is_err());
    }

    #[test]
    fn test_gates() {
        let v = DatabaseVersion::make(12, 10);
        assert!(v.is_same_or_after(12, 10));
        assert!(v.is_same_or_after(11, 70));
        assert!(v.is_before(14, 0));
        assert!(DatabaseVersion::make(9, 4) < DatabaseVersion::make(9, 5));
    }
}

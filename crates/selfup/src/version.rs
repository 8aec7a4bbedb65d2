//! Release versions.
//!
//! Release tags are compared on their `MAJOR.MINOR.PATCH` numbers only. The
//! raw tag is kept verbatim because it also names cache entries and
//! install directories.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::UpdateError;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[vV]?([0-9]+)\.([0-9]+)\.([0-9]+)").expect("valid version pattern")
});

/// A release version such as `v1.4.2` or `2.0.0-rc1`.
///
/// Equality and ordering only look at `(major, minor, patch)`; any suffix is
/// ignored.
#[derive(Debug, Clone)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    raw: String,
}

impl Version {
    /// Build a version from its components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            raw: format!("{major}.{minor}.{patch}"),
        }
    }

    /// Parse a version string, never failing.
    ///
    /// Strings that do not start with `[v]MAJOR.MINOR.PATCH`, and numeric
    /// components too large to represent, become `0`.
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_else(|_| Self {
            major: 0,
            minor: 0,
            patch: 0,
            raw: raw.to_string(),
        })
    }

    /// Parse a version string, rejecting anything that does not start with
    /// `[v]MAJOR.MINOR.PATCH`.
    pub fn try_parse(raw: &str) -> Result<Self, UpdateError> {
        let captures = VERSION_PATTERN
            .captures(raw)
            .ok_or_else(|| UpdateError::VersionParseError(format!("not a version: {raw:?}")))?;

        let component = |index: usize| {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        };

        Ok(Self {
            major: component(1),
            minor: component(2),
            patch: component(3),
            raw: raw.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn key(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
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
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

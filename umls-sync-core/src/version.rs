//! UMLS release version tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A UMLS release tag such as `2025AA` or `2025AB`.
///
/// The format is four digits (year) followed by two uppercase letters
/// (release cycle). Lexicographic order of the string form coincides with
/// chronological order, so `Ord` is derived from it directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseVersion(String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid UMLS release tag '{0}': expected four digits followed by two uppercase letters (e.g. 2025AA)")]
    InvalidFormat(String),
}

impl ReleaseVersion {
    pub fn parse(tag: &str) -> Result<Self, VersionError> {
        let bytes = tag.as_bytes();
        let well_formed = bytes.len() == 6
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[4..].iter().all(u8::is_ascii_uppercase);
        if !well_formed {
            return Err(VersionError::InvalidFormat(tag.to_string()));
        }
        Ok(ReleaseVersion(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReleaseVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReleaseVersion::parse(s)
    }
}

//! Extension unit entity GUIDs
//!
//! The UVC driver takes entity identifiers as 16 raw bytes in the mixed-endian
//! layout Microsoft GUIDs use in memory: the first three hyphen-delimited
//! groups are little-endian, the last two groups are kept in textual order.
//! [`Guid`] always stores that driver layout so it can be copied into ioctl
//! structures as-is.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Length of the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form
pub const GUID_STRING_LEN: usize = 36;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid GUID '{0}'")]
pub struct InvalidGuid(pub String);

/// A 128-bit entity identifier in driver byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid([u8; 16]);

impl Guid {
    /// Wrap bytes that are already in driver byte order
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parse the canonical hyphenated form (hex digits are case-insensitive).
    ///
    /// Braced, URN and unhyphenated spellings are rejected.
    pub fn parse(text: &str) -> Option<Self> {
        if text.len() != GUID_STRING_LEN {
            return None;
        }
        Uuid::parse_str(text).ok().map(|uuid| Self(uuid.to_bytes_le()))
    }
}

impl FromStr for Guid {
    type Err = InvalidGuid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidGuid(s.to_string()))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes_le(self.0).hyphenated())
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

//! Cache key normalization
//!
//! Caller keys (ad unit ids, URLs, arbitrary strings) are hashed into a
//! fixed-length lowercase hex identifier that is always a valid store key
//! and a safe file name.

use sha2::{Digest, Sha256};
use std::fmt;

/// A store-safe key derived from an arbitrary caller key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Hash a raw key. The empty string normalizes to the empty key.
    pub fn from_raw(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }

        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Absent keys normalize to the empty key rather than failing.
    pub fn from_optional(raw: Option<&str>) -> Self {
        raw.map(Self::from_raw).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

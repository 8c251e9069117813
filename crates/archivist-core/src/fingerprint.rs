//! Content fingerprints.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Content hash of an artifact's serialized bytes.
///
/// Rendered as the lowercase hex MD5 digest of the bytes. MD5 is fast and
/// wide enough for deduplication; it is not used for anything
/// security-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", md5::compute(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

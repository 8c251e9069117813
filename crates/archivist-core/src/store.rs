//! Version store abstraction.
//!
//! A version store is a versioned object store (S3 with bucket versioning,
//! or anything that behaves like it): every write to a key creates a new
//! version, and versions are listed newest-first.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A single object version as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersion {
    /// Object key. Listings are prefix-scoped, so this may be a sibling key.
    pub key: String,
    /// Backend-assigned version identifier.
    pub version_id: String,
}

/// Continuation point for a version listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionMarker {
    pub key: String,
    pub version_id: String,
}

impl VersionMarker {
    /// Some backends answer a truncated listing with a blank marker.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl From<&ObjectVersion> for VersionMarker {
    fn from(version: &ObjectVersion) -> Self {
        Self {
            key: version.key.clone(),
            version_id: version.version_id.clone(),
        }
    }
}

/// Parameters for one page of a version listing.
#[derive(Debug, Clone, Default)]
pub struct ListVersionsRequest {
    /// Only versions whose key starts with this prefix are listed.
    pub prefix: String,
    /// Page size hint. `None` uses the backend default.
    pub max_keys: Option<u32>,
    /// Resume after this version.
    pub marker: Option<VersionMarker>,
}

/// One page of a version listing, newest-first.
#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    pub versions: Vec<ObjectVersion>,
    /// Where the next page starts, if the backend reported it.
    pub next_marker: Option<VersionMarker>,
    /// Whether more pages remain.
    pub is_truncated: bool,
}

/// Trait for versioned object store backends.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Largest page a single listing call may return.
    fn max_page_size(&self) -> u32 {
        1000
    }

    /// List one page of object versions.
    async fn list_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage>;

    /// Fetch the bytes of a specific object version.
    async fn get_version(&self, key: &str, version_id: &str) -> Result<Bytes>;

    /// Write `body` as a new version of `key`.
    async fn put_version(&self, key: &str, body: Bytes) -> Result<()>;
}

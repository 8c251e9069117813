//! In-memory version store.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::store::{ListVersionsRequest, ObjectVersion, VersionMarker, VersionPage, VersionStore};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct StoredVersion {
    key: String,
    version_id: String,
    body: Bytes,
}

#[derive(Debug, Default)]
struct Inner {
    /// Every version ever written, oldest first.
    versions: Vec<StoredVersion>,
    next_id: u64,
    list_calls: usize,
}

/// Version store held entirely in memory.
///
/// Listings follow S3 semantics: keys in lexical order, and within a key
/// versions newest-first.
#[derive(Debug)]
pub struct MemoryVersionStore {
    page_size: u32,
    inner: Mutex<Inner>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Create a store whose listings return at most `page_size` versions.
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of versions stored under exactly `key`.
    pub async fn version_count(&self, key: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.versions.iter().filter(|v| v.key == key).count()
    }

    /// Number of `list_versions` calls served so far.
    pub async fn list_calls(&self) -> usize {
        self.inner.lock().await.list_calls
    }

    /// Versions matching `prefix` in listing order.
    fn listing<'a>(versions: &'a [StoredVersion], prefix: &str) -> Vec<&'a StoredVersion> {
        let mut listing: Vec<(usize, &StoredVersion)> = versions
            .iter()
            .enumerate()
            .filter(|(_, v)| v.key.starts_with(prefix))
            .collect();
        listing.sort_by(|(ia, a), (ib, b)| a.key.cmp(&b.key).then(ib.cmp(ia)));
        listing.into_iter().map(|(_, v)| v).collect()
    }

    fn start_after(listing: &[&StoredVersion], marker: &VersionMarker) -> usize {
        listing
            .iter()
            .position(|v| v.key == marker.key && v.version_id == marker.version_id)
            .map(|i| i + 1)
            .unwrap_or_else(|| listing.partition_point(|v| v.key.as_str() <= marker.key.as_str()))
    }
}

impl Default for MemoryVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn max_page_size(&self) -> u32 {
        self.page_size
    }

    async fn list_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage> {
        let mut inner = self.inner.lock().await;
        inner.list_calls += 1;

        let listing = Self::listing(&inner.versions, &request.prefix);
        let start = request
            .marker
            .as_ref()
            .map(|marker| Self::start_after(&listing, marker))
            .unwrap_or(0);
        let page_size = request
            .max_keys
            .unwrap_or(self.page_size)
            .clamp(1, self.page_size) as usize;

        let end = (start + page_size).min(listing.len());
        let versions: Vec<ObjectVersion> = listing[start.min(end)..end]
            .iter()
            .map(|v| ObjectVersion {
                key: v.key.clone(),
                version_id: v.version_id.clone(),
            })
            .collect();

        let is_truncated = end < listing.len();
        let next_marker = if is_truncated {
            versions.last().map(VersionMarker::from)
        } else {
            None
        };

        Ok(VersionPage {
            versions,
            next_marker,
            is_truncated,
        })
    }

    async fn get_version(&self, key: &str, version_id: &str) -> Result<Bytes> {
        let inner = self.inner.lock().await;
        inner
            .versions
            .iter()
            .find(|v| v.key == key && v.version_id == version_id)
            .map(|v| v.body.clone())
            .ok_or_else(|| {
                Error::backend("get_version", key, format!("no such version: {}", version_id))
            })
    }

    async fn put_version(&self, key: &str, body: Bytes) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let version_id = format!("v{:08}", inner.next_id);
        inner.versions.push(StoredVersion {
            key: key.to_string(),
            version_id,
            body,
        });
        Ok(())
    }
}

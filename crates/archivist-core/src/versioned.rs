//! Archive backed by a versioned object store.
//!
//! Every artifact is written as a new version of a single object key. The
//! archive keeps the fingerprints of every body it has seen so that
//! duplicates are neither re-written nor re-surfaced by `history`.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::history::HistoryWalker;
use crate::store::VersionStore;
use crate::{Archive, Fingerprint, Result};

/// How many versions the first write reads back to seed deduplication.
pub const BOOTSTRAP_LOOKBACK: usize = 100;

/// Tunables for a [`VersionedArchive`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Cap on the number of artifacts `history` returns.
    pub max_versions: Option<usize>,
    /// Trace walker and writer decisions.
    pub debug: bool,
}

impl ArchiveOptions {
    /// Options with a history cap; zero means unbounded.
    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = (max_versions > 0).then_some(max_versions);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Whether this instance has read the version stream yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryState {
    Uninitialized,
    Populated,
}

#[derive(Debug)]
struct ArchiveState {
    seen: HashSet<Fingerprint>,
    history: HistoryState,
}

/// Archive storing artifacts as versions of one key in a [`VersionStore`].
///
/// All operations on one instance are serialized through a single lock, so
/// the fingerprint set and history state are never observed mid-update.
/// Dropping an in-flight `history` or `put_bytes` future cancels the
/// backend call and leaves that state untouched.
pub struct VersionedArchive {
    store: Arc<dyn VersionStore>,
    key: String,
    options: ArchiveOptions,
    state: Mutex<ArchiveState>,
}

impl VersionedArchive {
    pub fn new(store: Arc<dyn VersionStore>, key: impl Into<String>, options: ArchiveOptions) -> Self {
        Self {
            store,
            key: key.into(),
            options,
            state: Mutex::new(ArchiveState {
                seen: HashSet::new(),
                history: HistoryState::Uninitialized,
            }),
        }
    }

    /// Object key holding the version stream.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Walk the version stream and commit what was found.
    async fn walk(&self, state: &mut ArchiveState, limit: Option<usize>) -> Result<Vec<Bytes>> {
        let outcome = HistoryWalker::new(self.store.as_ref(), &self.key, &state.seen)
            .limit(limit)
            .debug(self.options.debug)
            .walk()
            .await?;

        state.seen.extend(outcome.fingerprints);
        state.history = HistoryState::Populated;
        Ok(outcome.artifacts)
    }
}

#[async_trait]
impl Archive for VersionedArchive {
    fn name(&self) -> &'static str {
        self.store.name()
    }

    async fn history(&self) -> Result<Vec<Bytes>> {
        let mut state = self.state.lock().await;
        self.walk(&mut state, self.options.max_versions).await
    }

    async fn put_bytes(&self, body: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.history == HistoryState::Uninitialized {
            self.walk(&mut state, Some(BOOTSTRAP_LOOKBACK))
                .await
                .map_err(|e| e.context("error fetching history"))?;
        }

        let fingerprint = Fingerprint::of(&body);
        if state.seen.contains(&fingerprint) {
            verbose!(self.options.debug, key = %self.key, fingerprint = %fingerprint, "Skipping archival of existing version");
            return Ok(());
        }

        let size = body.len();
        self.store
            .put_version(&self.key, body)
            .await
            .map_err(|e| e.context("error archiving version"))?;

        info!(key = %self.key, fingerprint = %fingerprint, size, "Archived new version");
        state.seen.insert(fingerprint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ListVersionsRequest, ObjectVersion, VersionMarker, VersionPage};
    use crate::{ArchiveExt, Error, MemoryVersionStore};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const KEY: &str = "versions/state.json";

    fn archive(store: &Arc<MemoryVersionStore>, options: ArchiveOptions) -> VersionedArchive {
        VersionedArchive::new(store.clone(), KEY, options)
    }

    fn as_json(history: &[Bytes]) -> Vec<serde_json::Value> {
        history
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect()
    }

    /// Store that serves hand-built pages keyed by the request marker.
    struct ScriptedStore {
        pages: HashMap<Option<VersionMarker>, VersionPage>,
        bodies: HashMap<String, Bytes>,
        requests: std::sync::Mutex<Vec<ListVersionsRequest>>,
    }

    impl ScriptedStore {
        fn version(key: &str, id: &str) -> ObjectVersion {
            ObjectVersion {
                key: key.to_string(),
                version_id: id.to_string(),
            }
        }

        fn marker(key: &str, id: &str) -> Option<VersionMarker> {
            Some(VersionMarker {
                key: key.to_string(),
                version_id: id.to_string(),
            })
        }

        fn max_keys_requested(&self) -> Vec<Option<u32>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.max_keys)
                .collect()
        }
    }

    #[async_trait]
    impl VersionStore for ScriptedStore {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn list_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage> {
            self.requests.lock().unwrap().push(request.clone());
            self.pages
                .get(&request.marker)
                .cloned()
                .ok_or_else(|| Error::backend("list_versions", &request.prefix, "unexpected marker"))
        }

        async fn get_version(&self, key: &str, version_id: &str) -> Result<Bytes> {
            self.bodies
                .get(version_id)
                .cloned()
                .ok_or_else(|| Error::backend("get_version", key, "missing body"))
        }

        async fn put_version(&self, _key: &str, _body: Bytes) -> Result<()> {
            unimplemented!()
        }
    }

    /// Memory store whose downloads and listings can be switched to fail.
    struct FlakyStore {
        inner: MemoryVersionStore,
        fail_get: AtomicBool,
        fail_list: AtomicBool,
        puts: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryVersionStore::with_page_size(2),
                fail_get: AtomicBool::new(false),
                fail_list: AtomicBool::new(false),
                puts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VersionStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn max_page_size(&self) -> u32 {
            self.inner.max_page_size()
        }

        async fn list_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Error::backend("list_versions", &request.prefix, "access denied"));
            }
            self.inner.list_versions(request).await
        }

        async fn get_version(&self, key: &str, version_id: &str) -> Result<Bytes> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(Error::backend("get_version", key, "connection reset"));
            }
            self.inner.get_version(key, version_id).await
        }

        async fn put_version(&self, key: &str, body: Bytes) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put_version(key, body).await
        }
    }

    #[tokio::test]
    async fn test_history_on_empty_store_is_empty() {
        let store = Arc::new(MemoryVersionStore::new());
        let history = archive(&store, ArchiveOptions::default()).history().await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_history_returns_puts_oldest_first() {
        let store = Arc::new(MemoryVersionStore::with_page_size(3));
        let writer = archive(&store, ArchiveOptions::default());
        for i in 0..8 {
            writer.put(&json!({ "n": i })).await.unwrap();
        }

        let reader = archive(&store, ArchiveOptions::default());
        let history = as_json(&reader.history().await.unwrap());
        let expected: Vec<_> = (0..8).map(|i| json!({ "n": i })).collect();
        assert_eq!(history, expected);
    }

    #[tokio::test]
    async fn test_duplicate_put_is_not_rewritten() {
        let store = Arc::new(MemoryVersionStore::new());
        let writer = archive(&store, ArchiveOptions::default());
        writer.put(&json!({ "id": "a" })).await.unwrap();
        writer.put(&json!({ "id": "a" })).await.unwrap();
        assert_eq!(store.version_count(KEY).await, 1);

        let reader = archive(&store, ArchiveOptions::default());
        let history = reader.history().await.unwrap();
        assert_eq!(as_json(&history), vec![json!({ "id": "a" })]);
    }

    #[tokio::test]
    async fn test_history_collapses_physical_duplicates() {
        let store = Arc::new(MemoryVersionStore::new());
        for body in [r#"{"id":"a"}"#, r#"{"id":"b"}"#, r#"{"id":"a"}"#] {
            store.put_version(KEY, Bytes::from(body)).await.unwrap();
        }

        let history = archive(&store, ArchiveOptions::default()).history().await.unwrap();
        // Newest copy of "a" wins its position.
        assert_eq!(as_json(&history), vec![json!({ "id": "b" }), json!({ "id": "a" })]);
    }

    #[tokio::test]
    async fn test_first_put_dedups_against_existing_stream() {
        let store = Arc::new(MemoryVersionStore::new());
        archive(&store, ArchiveOptions::default())
            .put(&json!({ "id": "a" }))
            .await
            .unwrap();

        // A later process run sees the same artifact again.
        let next_run = archive(&store, ArchiveOptions::default());
        next_run.put(&json!({ "id": "a" })).await.unwrap();
        assert_eq!(store.version_count(KEY).await, 1);
        assert!(store.list_calls().await >= 1);
    }

    #[tokio::test]
    async fn test_bootstrap_happens_once() {
        let store = Arc::new(MemoryVersionStore::new());
        let writer = archive(&store, ArchiveOptions::default());
        writer.put(&json!({ "id": "a" })).await.unwrap();
        writer.put(&json!({ "id": "b" })).await.unwrap();
        writer.put(&json!({ "id": "c" })).await.unwrap();
        assert_eq!(store.list_calls().await, 1);
        assert_eq!(store.version_count(KEY).await, 3);
    }

    #[tokio::test]
    async fn test_history_populates_state_so_put_skips_bootstrap() {
        let store = Arc::new(MemoryVersionStore::new());
        let archive = archive(&store, ArchiveOptions::default());
        archive.history().await.unwrap();
        archive.put(&json!({ "id": "a" })).await.unwrap();
        assert_eq!(store.list_calls().await, 1);
    }

    #[tokio::test]
    async fn test_cap_returns_most_recent_oldest_first() {
        let store = Arc::new(MemoryVersionStore::with_page_size(4));
        let writer = archive(&store, ArchiveOptions::default());
        for i in 0..10 {
            writer.put(&json!({ "n": i })).await.unwrap();
        }

        let reader = archive(&store, ArchiveOptions::default().with_max_versions(3));
        let history = as_json(&reader.history().await.unwrap());
        assert_eq!(history, vec![json!({ "n": 7 }), json!({ "n": 8 }), json!({ "n": 9 })]);
    }

    #[tokio::test]
    async fn test_zero_max_versions_is_unbounded() {
        let options = ArchiveOptions::default().with_max_versions(0);
        assert_eq!(options.max_versions, None);

        let store = Arc::new(MemoryVersionStore::with_page_size(2));
        let writer = archive(&store, ArchiveOptions::default());
        for i in 0..5 {
            writer.put(&json!({ "n": i })).await.unwrap();
        }
        let history = archive(&store, options).history().await.unwrap();
        assert_eq!(history.len(), 5);
    }

    #[tokio::test]
    async fn test_cap_sets_page_size_hint() {
        let store = Arc::new(ScriptedStore {
            pages: HashMap::from([(
                None,
                VersionPage {
                    versions: vec![ScriptedStore::version(KEY, "2"), ScriptedStore::version(KEY, "1")],
                    next_marker: None,
                    is_truncated: false,
                },
            )]),
            bodies: HashMap::from([
                ("1".to_string(), Bytes::from_static(b"1")),
                ("2".to_string(), Bytes::from_static(b"2")),
            ]),
            requests: Default::default(),
        });

        let capped = VersionedArchive::new(store.clone(), KEY, ArchiveOptions::default().with_max_versions(5));
        capped.history().await.unwrap();
        let uncapped = VersionedArchive::new(store.clone(), KEY, ArchiveOptions::default().with_max_versions(5000));
        uncapped.history().await.unwrap();

        assert_eq!(store.max_keys_requested(), vec![Some(5), None]);
    }

    #[tokio::test]
    async fn test_sibling_keys_are_ignored() {
        let store = Arc::new(MemoryVersionStore::new());
        store.put_version(KEY, Bytes::from_static(b"\"mine\"")).await.unwrap();
        store
            .put_version("versions/state.json.bak", Bytes::from_static(b"\"sibling\""))
            .await
            .unwrap();

        let history = archive(&store, ArchiveOptions::default()).history().await.unwrap();
        assert_eq!(as_json(&history), vec![json!("mine")]);
    }

    #[tokio::test]
    async fn test_empty_continuation_marker_falls_back_to_last_version() {
        let sibling = "versions/state.json.old";
        let page1 = VersionPage {
            versions: vec![ScriptedStore::version(KEY, "v6"), ScriptedStore::version(KEY, "v5")],
            next_marker: ScriptedStore::marker(KEY, "v5"),
            is_truncated: true,
        };
        // Truncated, but the backend left the marker blank.
        let page2 = VersionPage {
            versions: vec![
                ScriptedStore::version(KEY, "v4"),
                ScriptedStore::version(KEY, "v3"),
                ScriptedStore::version(sibling, "s1"),
            ],
            next_marker: ScriptedStore::marker("", ""),
            is_truncated: true,
        };
        let page3 = VersionPage {
            versions: vec![ScriptedStore::version(sibling, "s0"), ScriptedStore::version(KEY, "v1")],
            next_marker: None,
            is_truncated: false,
        };

        let store = Arc::new(ScriptedStore {
            pages: HashMap::from([
                (None, page1),
                (ScriptedStore::marker(KEY, "v5"), page2),
                (ScriptedStore::marker(sibling, "s1"), page3),
            ]),
            bodies: HashMap::from([
                ("v6".to_string(), Bytes::from_static(b"6")),
                ("v5".to_string(), Bytes::from_static(b"5")),
                ("v4".to_string(), Bytes::from_static(b"4")),
                ("v3".to_string(), Bytes::from_static(b"5")),
                ("v1".to_string(), Bytes::from_static(b"1")),
            ]),
            requests: Default::default(),
        });

        let archive = VersionedArchive::new(store.clone(), KEY, ArchiveOptions::default());
        let history = archive.history().await.unwrap();
        let bodies: Vec<&[u8]> = history.iter().map(|b| b.as_ref()).collect();
        assert_eq!(bodies, vec![&b"1"[..], &b"4"[..], &b"5"[..], &b"6"[..]]);
        assert_eq!(store.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stalled_listing_is_an_error() {
        let page = VersionPage {
            versions: vec![ScriptedStore::version(KEY, "v2")],
            next_marker: None,
            is_truncated: true,
        };
        let store = Arc::new(ScriptedStore {
            pages: HashMap::from([(None, page.clone()), (ScriptedStore::marker(KEY, "v2"), page)]),
            bodies: HashMap::from([("v2".to_string(), Bytes::from_static(b"2"))]),
            requests: Default::default(),
        });

        let err = VersionedArchive::new(store, KEY, ArchiveOptions::default())
            .history()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend { operation: "list_versions", .. }));
    }

    #[tokio::test]
    async fn test_failed_history_commits_nothing() {
        let store = Arc::new(FlakyStore::new());
        for body in ["\"a\"", "\"b\"", "\"c\""] {
            store.inner.put_version(KEY, Bytes::from(body)).await.unwrap();
        }

        let archive = VersionedArchive::new(store.clone(), KEY, ArchiveOptions::default());
        store.fail_get.store(true, Ordering::SeqCst);
        let err = archive.history().await.unwrap_err();
        assert!(err.to_string().contains("error downloading object version"));
        assert!(err.to_string().contains(KEY));

        store.fail_get.store(false, Ordering::SeqCst);
        let history = archive.history().await.unwrap();
        assert_eq!(as_json(&history), vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_fails_put() {
        let store = Arc::new(FlakyStore::new());
        store.fail_list.store(true, Ordering::SeqCst);

        let archive = VersionedArchive::new(store.clone(), KEY, ArchiveOptions::default());
        let err = archive.put(&json!({ "id": "a" })).await.unwrap_err();
        assert!(err.to_string().contains("error fetching history"));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);

        // The bootstrap is retried on the next write.
        store.fail_list.store(false, Ordering::SeqCst);
        archive.put(&json!({ "id": "a" })).await.unwrap();
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_history_only_surfaces_new_versions() {
        let store = Arc::new(MemoryVersionStore::new());
        let archive = archive(&store, ArchiveOptions::default());
        store.put_version(KEY, Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(archive.history().await.unwrap().len(), 1);

        store.put_version(KEY, Bytes::from_static(b"2")).await.unwrap();
        let history = archive.history().await.unwrap();
        assert_eq!(history, vec![Bytes::from_static(b"2")]);
    }

    #[tokio::test]
    async fn test_put_then_history_on_same_instance_hides_own_writes() {
        let store = Arc::new(MemoryVersionStore::new());
        let archive = archive(&store, ArchiveOptions::default());
        archive.put(&json!({ "id": "a" })).await.unwrap();
        assert!(archive.history().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_puts_record_every_fingerprint() {
        let store = Arc::new(MemoryVersionStore::new());
        let archive = Arc::new(archive(&store, ArchiveOptions::default()));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let archive = archive.clone();
                tokio::spawn(async move { archive.put(&json!({ "worker": i })).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(archive.state.lock().await.seen.len(), 64);
        assert_eq!(store.version_count(KEY).await, 64);
        assert_eq!(store.list_calls().await, 1);
    }

    #[tokio::test]
    async fn test_name_comes_from_store() {
        let store = Arc::new(MemoryVersionStore::new());
        assert_eq!(archive(&store, ArchiveOptions::default()).name(), "memory");
    }
}

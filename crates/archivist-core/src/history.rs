//! History walker: pages through a version listing and collects the
//! distinct artifact bodies stored under one key.

use bytes::Bytes;
use std::collections::HashSet;

use crate::store::{ListVersionsRequest, VersionMarker, VersionStore};
use crate::{Error, Fingerprint, Result};

/// Artifacts collected by a completed walk.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Artifact bodies, oldest first.
    pub artifacts: Vec<Bytes>,
    /// Fingerprints first observed during this walk.
    pub fingerprints: Vec<Fingerprint>,
    /// Number of listing pages requested.
    pub pages: usize,
}

/// Walks the version stream of a single key, newest-first, skipping bodies
/// whose fingerprint is already known.
///
/// The walk never mutates the caller's fingerprint set. Newly observed
/// fingerprints are handed back in [`WalkOutcome`] so the caller can commit
/// them once the whole walk has succeeded.
pub struct HistoryWalker<'a> {
    store: &'a dyn VersionStore,
    key: &'a str,
    known: &'a HashSet<Fingerprint>,
    limit: Option<usize>,
    debug: bool,
}

impl<'a> HistoryWalker<'a> {
    pub fn new(store: &'a dyn VersionStore, key: &'a str, known: &'a HashSet<Fingerprint>) -> Self {
        Self {
            store,
            key,
            known,
            limit: None,
            debug: false,
        }
    }

    /// Stop after collecting `limit` artifacts. `None` or zero walks the
    /// whole stream.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|n| *n > 0);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn first_request(&self) -> ListVersionsRequest {
        let max_page = self.store.max_page_size() as usize;
        ListVersionsRequest {
            prefix: self.key.to_string(),
            max_keys: self
                .limit
                .filter(|limit| *limit < max_page)
                .map(|limit| limit as u32),
            marker: None,
        }
    }

    /// Run the walk to completion.
    ///
    /// Any listing or download error aborts the walk; nothing collected so
    /// far is returned.
    pub async fn walk(self) -> Result<WalkOutcome> {
        let mut request = self.first_request();
        let mut newest_first: Vec<Bytes> = Vec::new();
        let mut fresh: HashSet<Fingerprint> = HashSet::new();
        let mut fingerprints: Vec<Fingerprint> = Vec::new();
        let mut pages = 0usize;

        loop {
            verbose!(self.debug, key = %self.key, marker = ?request.marker, "Retrieving batch of archived versions");
            let page = self
                .store
                .list_versions(&request)
                .await
                .map_err(|e| e.context("error listing object versions"))?;
            pages += 1;

            for version in &page.versions {
                // Listings are prefix-scoped; sibling keys share the prefix.
                if version.key != self.key {
                    continue;
                }

                let body = self
                    .store
                    .get_version(&version.key, &version.version_id)
                    .await
                    .map_err(|e| e.context("error downloading object version"))?;

                let fingerprint = Fingerprint::of(&body);
                if self.known.contains(&fingerprint) || fresh.contains(&fingerprint) {
                    verbose!(self.debug, fingerprint = %fingerprint, version_id = %version.version_id, "Ignoring version with previously seen fingerprint");
                    continue;
                }

                verbose!(self.debug, fingerprint = %fingerprint, version_id = %version.version_id, size = body.len(), "Adding archived version to history");
                newest_first.push(body);
                fresh.insert(fingerprint.clone());
                fingerprints.push(fingerprint);

                if let Some(limit) = self.limit {
                    if newest_first.len() >= limit {
                        verbose!(self.debug, limit, "Truncating archive history: max version limit reached");
                        return Ok(Self::finish(newest_first, fingerprints, pages));
                    }
                }
            }

            if !page.is_truncated || page.versions.is_empty() {
                verbose!(self.debug, pages, "Reached end of archive history");
                return Ok(Self::finish(newest_first, fingerprints, pages));
            }

            let next = match page.next_marker.filter(|marker| !marker.is_empty()) {
                Some(marker) => marker,
                None => {
                    // Truncated page with a blank marker: resume after the
                    // last version we were shown.
                    let Some(last) = page.versions.last() else {
                        return Ok(Self::finish(newest_first, fingerprints, pages));
                    };
                    verbose!(self.debug, key = %last.key, version_id = %last.version_id, "Backend returned an empty continuation marker, resuming after last listed version");
                    VersionMarker::from(last)
                }
            };

            if request.marker.as_ref() == Some(&next) {
                return Err(Error::backend(
                    "list_versions",
                    self.key,
                    format!(
                        "listing did not advance past version {} of {}",
                        next.version_id, next.key
                    ),
                ));
            }
            request.marker = Some(next);
        }
    }

    fn finish(
        mut newest_first: Vec<Bytes>,
        fingerprints: Vec<Fingerprint>,
        pages: usize,
    ) -> WalkOutcome {
        newest_first.reverse();
        WalkOutcome {
            artifacts: newest_first,
            fingerprints,
            pages,
        }
    }
}

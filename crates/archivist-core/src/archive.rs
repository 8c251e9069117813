//! Archive trait and the no-op archive.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{self, BoxFuture};
use serde::Serialize;

use crate::{Error, Result};

/// An append-only, content-deduplicated archive of artifacts.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Name of this archive variant.
    fn name(&self) -> &'static str;

    /// Previously archived artifacts, oldest first.
    async fn history(&self) -> Result<Vec<Bytes>>;

    /// Archive an already-serialized artifact unless its content is known.
    async fn put_bytes(&self, body: Bytes) -> Result<()>;
}

/// Serializing helpers available on every [`Archive`].
pub trait ArchiveExt: Archive {
    /// Serialize `artifact` as JSON and archive it.
    fn put<'a, T>(&'a self, artifact: &T) -> BoxFuture<'a, Result<()>>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(artifact) {
            Ok(body) => self.put_bytes(Bytes::from(body)),
            Err(e) => Box::pin(future::ready(Err(Error::Serialization(format!(
                "error serializing artifact: {}",
                e
            ))))),
        }
    }
}

impl<A: Archive + ?Sized> ArchiveExt for A {}

/// Archive that stores nothing and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyArchive;

#[async_trait]
impl Archive for EmptyArchive {
    fn name(&self) -> &'static str {
        "empty"
    }

    async fn history(&self) -> Result<Vec<Bytes>> {
        Ok(Vec::new())
    }

    async fn put_bytes(&self, _body: Bytes) -> Result<()> {
        Ok(())
    }
}

//! Core domain types and traits for the Archivist version archive.
//!
//! This crate contains:
//! - Error types shared by every backend
//! - Content fingerprints used for deduplication
//! - The version store abstraction over versioned object stores
//! - The archive trait, the no-op archive and the versioned archive
//! - An in-memory version store

/// Emit a `debug!` event only when verbose archive tracing is enabled.
macro_rules! verbose {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            tracing::debug!($($arg)+);
        }
    };
}

pub mod archive;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod memory;
pub mod store;
pub mod versioned;

pub use archive::{Archive, ArchiveExt, EmptyArchive};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use memory::MemoryVersionStore;
pub use store::{ListVersionsRequest, ObjectVersion, VersionMarker, VersionPage, VersionStore};
pub use versioned::{ArchiveOptions, VersionedArchive};

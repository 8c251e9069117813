//! Version store backends for Archivist.
//!
//! Provides the S3 backend and the factory that turns an
//! [`ArchiveConfig`] into a ready-to-use [`Archive`]:
//! - `empty` (or unset): archiving disabled
//! - `s3`: versioned S3 bucket

pub mod credentials;
pub mod s3;

use std::sync::Arc;

use archivist_config::{ArchiveConfig, ArchiveType, ConfigError};
use archivist_core::{ArchiveOptions, EmptyArchive, Error, Result, VersionedArchive};
use tracing::info;

pub use archivist_core::{Archive, ArchiveExt};
pub use credentials::{load_sdk_config, static_credentials};
pub use s3::S3VersionStore;

fn config_error(err: ConfigError) -> Error {
    Error::Config(err.to_string())
}

/// Build the archive selected by `config`.
pub async fn open_archive(config: &ArchiveConfig) -> Result<Arc<dyn Archive>> {
    config.validate().map_err(config_error)?;

    match config.archive_type().map_err(config_error)? {
        ArchiveType::Empty => {
            info!("Archiving disabled");
            Ok(Arc::new(EmptyArchive))
        }
        ArchiveType::S3 => {
            let s3 = config.s3().map_err(config_error)?;
            let store = S3VersionStore::new(s3).await?;
            info!(bucket = %s3.bucket, key = %s3.key, region = %s3.region, "Opened S3 archive");

            let options = ArchiveOptions::default()
                .with_max_versions(s3.max_versions)
                .with_debug(config.debug);
            Ok(Arc::new(VersionedArchive::new(
                Arc::new(store),
                s3.key.clone(),
                options,
            )))
        }
    }
}

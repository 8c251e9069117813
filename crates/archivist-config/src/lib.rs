//! JSON configuration parsing for Archivist.
//!
//! This crate handles:
//! - Archive selection (`type` discriminator)
//! - S3 backend settings and static credentials
//! - Validation of required and paired fields

pub mod archive;
pub mod error;

pub use archive::{ArchiveConfig, ArchiveType, S3Config, S3Credentials};
pub use error::{ConfigError, ConfigResult};

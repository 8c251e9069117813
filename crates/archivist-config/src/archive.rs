//! Archive configuration.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Archive variant selected by the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// Archiving disabled.
    Empty,
    /// Versioned S3 bucket.
    S3,
}

/// Top-level archive configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// `"empty"` (or unset) or `"s3"`.
    #[serde(rename = "type", default)]
    pub archive_type: String,
    /// Trace walker and writer decisions.
    #[serde(default)]
    pub debug: bool,
    /// Required when `type` is `"s3"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

/// S3 backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub key: String,
    pub region: String,
    /// Cap on artifacts returned by history; 0 means unbounded.
    #[serde(default)]
    pub max_versions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<S3Credentials>,
    /// S3-compatible endpoint, addressed path-style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Static credentials overriding environment discovery.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct S3Credentials {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl ArchiveConfig {
    /// Parse configuration from JSON text.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Resolve the `type` discriminator.
    pub fn archive_type(&self) -> ConfigResult<ArchiveType> {
        match self.archive_type.as_str() {
            "" | "empty" => Ok(ArchiveType::Empty),
            "s3" => Ok(ArchiveType::S3),
            other => Err(ConfigError::UnsupportedType(other.to_string())),
        }
    }

    /// The S3 section, which must be present.
    pub fn s3(&self) -> ConfigResult<&S3Config> {
        self.s3
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("s3".to_string()))
    }

    /// Check required and paired fields for the selected archive type.
    pub fn validate(&self) -> ConfigResult<()> {
        match self.archive_type()? {
            ArchiveType::Empty => Ok(()),
            ArchiveType::S3 => self.s3()?.validate(),
        }
    }
}

impl S3Config {
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("s3.bucket", &self.bucket),
            ("s3.key", &self.key),
            ("s3.region", &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }

        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }

        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
                field: "s3.endpoint".to_string(),
                message: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    field: "s3.endpoint".to_string(),
                    message: format!("unsupported scheme: {}", url.scheme()),
                });
            }
        }

        Ok(())
    }
}

impl S3Credentials {
    /// Access and secret keys are required together.
    pub fn validate(&self) -> ConfigResult<()> {
        match (self.access_key.is_empty(), self.secret_key.is_empty()) {
            (false, true) => Err(ConfigError::MissingField(
                "s3.credentials.secret_key".to_string(),
            )),
            (true, false) => Err(ConfigError::MissingField(
                "s3.credentials.access_key".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Whether any static key material was provided.
    pub fn is_empty(&self) -> bool {
        self.access_key.is_empty() && self.secret_key.is_empty()
    }
}

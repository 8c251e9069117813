//! Versioned S3 bucket backend.
//!
//! Uses the AWS SDK for `ListObjectVersions`, versioned `GetObject` and
//! `PutObject`. An optional `endpoint` points the client at an
//! S3-compatible store with path-style addressing.

use archivist_config::S3Config;
use archivist_core::store::{
    ListVersionsRequest, ObjectVersion, VersionMarker, VersionPage, VersionStore,
};
use archivist_core::{Error, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::RequestChecksumCalculation;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::list_object_versions::ListObjectVersionsOutput;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::credentials::load_sdk_config;

/// Largest page `ListObjectVersions` will return.
pub const MAX_KEYS_LIMIT: u32 = 1000;

/// Render an SDK failure as `"<code>: <message>"` when S3 sent an error
/// body, or the full error chain otherwise.
fn describe_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some(code) => format!("{}: {}", code, err.message().unwrap_or_default()),
        None => DisplayErrorContext(err).to_string(),
    }
}

/// Convert one listing page. Delete markers are reported separately by S3
/// and never appear here.
fn page_from_output(output: &ListObjectVersionsOutput) -> VersionPage {
    let versions = output
        .versions()
        .iter()
        .filter_map(|v| {
            Some(ObjectVersion {
                key: v.key()?.to_string(),
                version_id: v.version_id()?.to_string(),
            })
        })
        .collect();

    let next_marker = output.next_key_marker().map(|key| VersionMarker {
        key: key.to_string(),
        version_id: output.next_version_id_marker().unwrap_or_default().to_string(),
    });

    VersionPage {
        versions,
        next_marker,
        is_truncated: output.is_truncated().unwrap_or(false),
    }
}

/// Version store backed by a versioned S3 bucket.
pub struct S3VersionStore {
    client: Client,
    bucket: String,
}

impl S3VersionStore {
    /// Create a store for the bucket and region in `config`, resolving
    /// credentials through [`load_sdk_config`].
    pub async fn new(config: &S3Config) -> Result<Self> {
        let sdk_config = load_sdk_config(config).await;
        Self::from_sdk_config(&sdk_config, config)
    }

    /// Create a store from an already loaded SDK configuration.
    pub fn from_sdk_config(sdk_config: &SdkConfig, config: &S3Config) -> Result<Self> {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);

        if let Some(endpoint) = config.endpoint.as_deref() {
            url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid s3 endpoint {}: {}", endpoint, e)))?;
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl VersionStore for S3VersionStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn max_page_size(&self) -> u32 {
        MAX_KEYS_LIMIT
    }

    async fn list_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage> {
        let mut call = self
            .client
            .list_object_versions()
            .bucket(&self.bucket)
            .prefix(&request.prefix);
        if let Some(max_keys) = request.max_keys {
            call = call.max_keys(max_keys.min(MAX_KEYS_LIMIT) as i32);
        }
        if let Some(marker) = &request.marker {
            call = call.key_marker(&marker.key);
            if !marker.version_id.is_empty() {
                call = call.version_id_marker(&marker.version_id);
            }
        }

        debug!(bucket = %self.bucket, prefix = %request.prefix, "Listing object versions");
        let output = call
            .send()
            .await
            .map_err(|e| Error::backend("list_versions", &request.prefix, describe_error(&e)))?;
        Ok(page_from_output(&output))
    }

    async fn get_version(&self, key: &str, version_id: &str) -> Result<Bytes> {
        debug!(bucket = %self.bucket, key = %key, version_id = %version_id, "Downloading object version");
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| Error::backend("get_version", key, describe_error(&e)))?;

        let body = output.body.collect().await.map_err(|e| {
            Error::backend(
                "get_version",
                key,
                format!("error reading object version content: {}", e),
            )
        })?;
        Ok(body.into_bytes())
    }

    async fn put_version(&self, key: &str, body: Bytes) -> Result<()> {
        debug!(bucket = %self.bucket, key = %key, size = body.len(), "Uploading object version");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::backend("put_version", key, describe_error(&e)))?;
        Ok(())
    }
}

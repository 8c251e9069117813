//! AWS configuration and credential resolution.

use archivist_config::{S3Config, S3Credentials};
use aws_config::{Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use tracing::debug;

/// Provider name attached to credentials taken from the archive config.
pub const STATIC_PROVIDER: &str = "archivist-config";

/// Static credentials from the archive configuration, when any key material
/// was given.
pub fn static_credentials(configured: Option<&S3Credentials>) -> Option<Credentials> {
    let creds = configured.filter(|c| !c.is_empty())?;
    Some(Credentials::new(
        creds.access_key.clone(),
        creds.secret_key.clone(),
        creds.session_token.clone().filter(|t| !t.is_empty()),
        None,
        STATIC_PROVIDER,
    ))
}

/// Load the shared AWS configuration for `config`.
///
/// Static credentials in the config win. Otherwise the SDK's default
/// provider chain is used: environment variables, shared profile files,
/// web identity tokens, container credentials and instance metadata.
pub async fn load_sdk_config(config: &S3Config) -> SdkConfig {
    let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));

    match static_credentials(config.credentials.as_ref()) {
        Some(credentials) => {
            debug!(access_key_id = %credentials.access_key_id(), "Using static AWS credentials from configuration");
            loader = loader.credentials_provider(credentials);
        }
        None => debug!("Using default AWS credential chain"),
    }

    loader.load().await
}

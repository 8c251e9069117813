//! CLI command implementations.

use anyhow::{Context, Result};
use archivist_config::ArchiveConfig;
use archivist_store::{ArchiveExt, open_archive};
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

pub fn load(path: &Path) -> Result<ArchiveConfig> {
    ArchiveConfig::from_path(path)
        .with_context(|| format!("error loading configuration from {}", path.display()))
}

/// Render an archived artifact as a single line of JSON.
fn render_line(artifact: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(artifact) {
        Ok(value) => value.to_string(),
        // Not ours; print it as-is.
        Err(_) => String::from_utf8_lossy(artifact).trim_end().to_string(),
    }
}

pub async fn history(config: &ArchiveConfig, max_versions: Option<usize>) -> Result<()> {
    let mut config = config.clone();
    if let (Some(max_versions), Some(s3)) = (max_versions, config.s3.as_mut()) {
        s3.max_versions = max_versions;
    }

    let archive = open_archive(&config).await?;
    let history = archive
        .history()
        .await
        .context("error fetching archive history")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for artifact in &history {
        writeln!(out, "{}", render_line(artifact))?;
    }
    info!(count = history.len(), "Retrieved archive history");
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("error reading document from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("error reading {}", input))
    }
}

pub async fn put(config: &ArchiveConfig, input: &str) -> Result<()> {
    let raw = read_input(input)?;
    let document: serde_json::Value =
        serde_json::from_str(&raw).context("document is not valid JSON")?;

    let archive = open_archive(config).await?;
    archive
        .put(&document)
        .await
        .context("error archiving document")?;
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    match load(path).and_then(|config| config.validate().map_err(Into::into)) {
        Ok(()) => {
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

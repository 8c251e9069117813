//! Archivist CLI tool.

use archivist_config::ArchiveConfig;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Versioned artifact archive CLI", long_about = None)]
struct Cli {
    /// Archive configuration file (JSON)
    #[arg(
        long,
        short,
        global = true,
        env = "ARCHIVIST_CONFIG",
        default_value = "archive.json"
    )]
    config: PathBuf,

    /// Trace archive decisions (overrides the config's `debug` flag)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print archived artifacts, oldest first, one JSON document per line
    History {
        /// Maximum number of artifacts to return (0 for all)
        #[arg(long)]
        max_versions: Option<usize>,
    },
    /// Archive a JSON document unless an identical one is already archived
    Put {
        /// File containing the document, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,
    },
    /// Validate an archive configuration
    Validate,
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load the configuration and install tracing at the level it asks for.
fn setup(path: &Path, debug: bool) -> anyhow::Result<ArchiveConfig> {
    let mut config = commands::load(path)?;
    config.debug |= debug;
    init_tracing(config.debug);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::History { max_versions } => {
            let config = setup(&cli.config, cli.debug)?;
            commands::history(&config, max_versions).await?;
        }
        Commands::Put { input } => {
            let config = setup(&cli.config, cli.debug)?;
            commands::put(&config, &input).await?;
        }
        Commands::Validate => {
            init_tracing(cli.debug);
            commands::validate(&cli.config)?;
        }
    }

    Ok(())
}

//! stream-restore command-line tool
//!
//! Inspects and edits the stream preference database through the same
//! extension commands control clients use.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use stream_restore::config::RestoreConfig;
use stream_restore::core::MemoryCore;
use stream_restore::paths::AppPaths;
use stream_restore::{PreferenceStore, StreamRestore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use crate::cli::{Command, Session};

/// Stream restore - remembered volume, mute and device per audio stream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "STREAM_RESTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Preference database directory (overrides the configuration)
    #[arg(long, env = "STREAM_RESTORE_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.log_json)?;

    let paths = AppPaths::detect();
    paths.ensure_directories()?;

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    info!("Configuration file: {}", config_path.display());
    let config = RestoreConfig::load_or_default(&config_path).await?;

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.database_path(&paths));
    let store = PreferenceStore::open(&db_path)
        .with_context(|| format!("Failed to open preference database at {}", db_path.display()))?;

    let mut core = MemoryCore::new();
    let restore = StreamRestore::init(store, &config, &config.seed_table(&paths), &mut core)
        .context("Failed to initialise stream restore")?;

    let mut session = Session::new(restore, core);
    let result = match &args.command {
        Command::Repl => cli::run_repl(&mut session),
        command => session.run(command),
    };
    session.finish();

    result
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}

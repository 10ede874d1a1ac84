//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific
//! modules.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;
use crate::services::ingest::DedupPolicy;

#[derive(Parser)]
#[command(name = "wto")]
#[command(about = "WTO document acquisition and archiving system")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ./wtoacquire.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config file and DATABASE_URL)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database (idempotent)
    Init,

    /// Crawl the results listing and ingest discovered documents
    Crawl {
        /// Listing URL to start from (overrides config)
        #[arg(long)]
        start_url: Option<String>,

        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Dedup policy: url updates in place, content-hash skips known content
        #[arg(long, value_enum)]
        dedup_by: Option<DedupPolicy>,
    },

    /// Show store counts
    Status,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let database_url = settings.database.resolve_url(cli.database.as_deref());

    match cli.command {
        Commands::Init => commands::init::run(&database_url).await,
        Commands::Crawl {
            start_url,
            max_pages,
            dedup_by,
        } => commands::crawl::run(&settings, &database_url, start_url, max_pages, dedup_by).await,
        Commands::Status => commands::status::run(&database_url).await,
    }
}

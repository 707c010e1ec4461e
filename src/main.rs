//! # vosdroits index CLI (`vdi`)
//!
//! The `vdi` binary is the primary interface for the index. It provides
//! commands for database initialization, archive sync, search, document
//! retrieval and a health overview.
//!
//! ## Usage
//!
//! ```bash
//! vdi --config ./config/vdi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vdi init` | Create the SQLite database and run schema migrations |
//! | `vdi sync` | Stream the export archive into the database |
//! | `vdi search "<query>"` | Search indexed documents |
//! | `vdi get <id>` | Print one document |
//! | `vdi stats` | Document counts and recent sync runs |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! vdi init --config ./config/vdi.toml
//!
//! # Sync from a mirror instead of the configured URL
//! vdi sync --url https://mirror.example/vosdroits-latest.zip
//!
//! # Search within one theme
//! vdi search "carte grise" --theme N19812
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vosdroits_index::config::{self, LoggingConfig};
use vosdroits_index::models::SearchFilters;
use vosdroits_index::progress::ProgressMode;
use vosdroits_index::{get, ingest, migrate, search, stats};

#[derive(Parser)]
#[command(
    name = "vdi",
    about = "vosdroits index — streaming ingestion and full-text search over the public-service export",
    version,
    long_about = "Downloads the administrative-content XML export as a ZIP archive, streams its \
    entries into a local SQLite database with an FTS5 index, and answers ranked full-text \
    searches with a substring fallback."
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/vdi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file (if missing) and runs all
    /// migrations. Safe to run multiple times (idempotent).
    Init,

    /// Download the archive and upsert every document and theme.
    Sync {
        /// Archive URL, overriding `[archive].url`.
        #[arg(long)]
        url: Option<String>,

        /// Progress output on stderr: human, json or off.
        /// Defaults to human on a terminal, off otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Search indexed documents.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to a theme, by id or title.
        #[arg(long)]
        theme: Option<String>,

        /// Restrict to an audience (substring match).
        #[arg(long)]
        audience: Option<String>,

        /// Maximum number of results (1 to 100).
        #[arg(long)]
        limit: Option<i64>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a document by id (for example `F14929`).
    Get {
        id: String,

        /// Print the document as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show document counts and recent sync runs.
    Stats,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { url, progress } => {
            let mode = match progress.as_deref() {
                Some(value) => ProgressMode::parse(value).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Unknown progress mode: {}. Use human, json, or off.",
                        value
                    )
                })?,
                None => ProgressMode::default_for_tty(),
            };
            let reporter = mode.reporter();
            ingest::run_sync(&cfg, url, reporter.as_ref()).await?;
        }
        Commands::Search {
            query,
            theme,
            audience,
            limit,
            json,
        } => {
            let filters = SearchFilters { theme, audience };
            search::run_search(&cfg, &query, filters, limit, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

//! # commitfeed CLI (`cfeed`)
//!
//! ## Usage
//!
//! ```bash
//! cfeed --config ./config/cfeed.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cfeed init` | Create the SQLite schema and seed sources |
//! | `cfeed sync` | Fetch one page of commit search results and ingest it |
//! | `cfeed recent` | List commits newer than a date, with authors |
//! | `cfeed stats` | Row counts per table |
//! | `cfeed serve` | Start the read-only HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! cfeed init
//! cfeed sync --query "fix typo"
//! cfeed sync --file ./saved/search.json --limit 10
//! cfeed recent --since 2015-09-02 --json
//! ```

mod config;
mod db;
mod github;
mod ingest;
mod logging;
mod migrate;
mod recent;
mod server;
mod sqlite_store;
mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// commitfeed: ingest commit search results into a normalized SQLite store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cfeed.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cfeed",
    about = "Ingest commit search results into a normalized SQLite store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cfeed.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file, the four tables, and the seeded source
    /// rows. Safe to run repeatedly.
    Init,

    /// Fetch one page of commit search results and ingest it.
    ///
    /// Items that fail are reported and skipped; the rest are stored.
    Sync {
        /// Search query (overrides `github.query`).
        #[arg(long)]
        query: Option<String>,

        /// Ingest a saved search response instead of calling the API.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Only ingest the first N items.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List commits authored after a date, newest first.
    Recent {
        /// Cutoff (YYYY-MM-DD or RFC 3339). Defaults to 7 days ago.
        #[arg(long)]
        since: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show row counts per table.
    Stats,

    /// Start the read-only HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging.level)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { query, file, limit } => {
            let opts = ingest::SyncOptions { query, file, limit };
            ingest::run_sync(&cfg, opts).await?;
        }
        Commands::Recent { since, json } => {
            recent::run_recent(&cfg, since, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

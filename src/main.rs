//! # Catalog Harvest CLI (`harvest`)
//!
//! The `harvest` binary pulls exercises from the configured catalog
//! providers, reconciles them into one canonical record per exercise,
//! optionally enriches them with media, and upserts the result into SQLite.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite store and run schema migrations |
//! | `harvest sources` | List providers and media sources with their status |
//! | `harvest run` | Fetch, normalize, merge, enrich and upsert |
//! | `harvest stats` | Summarize what the store holds |
//! | `harvest duplicates` | List near-duplicate pairs queued for review |
//!
//! ## Examples
//!
//! ```bash
//! # Only wger and ExerciseDB, at most 100 exercises each
//! harvest run --providers wger,exercisedb --limit 100
//!
//! # Attach YouTube/Giphy media to records that have none
//! YOUTUBE_API_KEY=... harvest run --enrich true
//!
//! # See what a run would do without writing
//! harvest run --dry-run
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); stdout carries the run
//! summary only.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use catalog_harvest::config::{self, Config};
use catalog_harvest::ingest::{self, IngestOptions};
use catalog_harvest::models::parse_provider_list;
use catalog_harvest::{migrate, sources, stats};

const DEFAULT_CONFIG: &str = "./config/harvest.toml";

/// Catalog Harvest CLI — multi-provider exercise catalog ingestion.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Catalog Harvest — pull, reconcile and store exercises from several catalog APIs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. When that default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema.
    ///
    /// Creates the SQLite file and the `exercises` and
    /// `possible_duplicates` tables. Running it again is safe.
    Init,

    /// List catalog providers and media sources with their status.
    Sources,

    /// Run the harvest pipeline once.
    Run {
        /// Comma-separated providers in merge priority order
        /// (`wger`, `exercisedb`, `ninjas`).
        #[arg(long)]
        providers: Option<String>,

        /// Maximum candidates taken from each provider.
        #[arg(long)]
        limit: Option<usize>,

        /// Look up media for records that have none (`true`/`false`).
        #[arg(long)]
        enrich: Option<bool>,

        /// Override the store path from the config file.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Fetch, merge and report without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show store statistics.
    Stats,

    /// List possible duplicates queued for review.
    Duplicates,
}

fn load(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::info!("no config at {}, using defaults", DEFAULT_CONFIG);
        return Ok(Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Store initialized at {}.", cfg.db.path.display());
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Run {
            providers,
            limit,
            enrich,
            db,
            dry_run,
        } => {
            let providers = providers.as_deref().map(parse_provider_list).transpose()?;
            let opts = IngestOptions {
                providers,
                limit,
                enrich,
                db,
                dry_run,
            };
            ingest::run_ingest(&cfg, opts).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Duplicates => {
            stats::list_duplicates(&cfg).await?;
        }
    }

    Ok(())
}

//! CLI command definitions and dispatch.
//!
//! Each group of subcommands is implemented in its own submodule:
//! - `health`: health report, cleanup, clearing all cached data
//! - `enrich`: the enrichment queue and catalog lookups
//! - `ranks`: ranked listing, rank history and play-count reconciliation

mod enrich;
mod health;
mod ranks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::library::JsonLibrarySource;
use crate::model::SortConfiguration;
use crate::service::RankService;

pub use enrich::{cmd_enrich, cmd_queue};
pub use health::{cmd_cleanup, cmd_clear, cmd_health};
pub use ranks::{cmd_ranks, cmd_reconcile};

/// Library export read when neither `--library` nor the config names one
const DEFAULT_LIBRARY_EXPORT: &str = "library.json";

/// PlayRank CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: OS config dir)
    #[arg(long, global = true, env = "PLAYRANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON library export
    #[arg(short, long, global = true, env = "PLAYRANK_LIBRARY")]
    pub library: Option<PathBuf>,

    /// SQLite cache database
    #[arg(long, global = true, env = "PLAYRANK_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the cache health score and recommendations
    Health,
    /// Sweep the caches
    Cleanup {
        /// Tightened max ages plus orphan removal
        #[arg(long)]
        emergency: bool,
        /// Run even if no cleanup is due
        #[arg(long)]
        force: bool,
    },
    /// Show the enrichment queue
    Queue {
        /// Items to list
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Active sort, e.g. play_count_desc or title_asc
        #[arg(long)]
        sort: Option<String>,
        /// Include zero-play entries
        #[arg(long)]
        idle: bool,
    },
    /// Look queued entries up in MusicBrainz
    Enrich {
        /// Show what would be looked up without sending requests
        #[arg(long)]
        dry_run: bool,
        /// Stop after this many batches
        #[arg(long)]
        batches: Option<usize>,
        /// Skip cover art downloads
        #[arg(long)]
        no_artwork: bool,
        /// Ignore the pass cooldown
        #[arg(long)]
        force: bool,
    },
    /// List entries by rank with movement since the last snapshot
    Ranks {
        /// Sort configuration, e.g. play_count_desc
        #[arg(long)]
        sort: Option<String>,
        /// Rows to print
        #[arg(short = 'n', long, default_value = "25")]
        limit: usize,
        /// Save a snapshot after printing
        #[arg(long)]
        save: bool,
    },
    /// Fold local play counts into the system counts
    Reconcile,
    /// Delete every cache entry, snapshot and local play count
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let mut config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };
    if let Some(db) = &cli.db {
        config.store.database_path = Some(db.clone());
    }
    if let Some(library) = &cli.library {
        config.library.export_path = Some(library.clone());
    }

    match &cli.command {
        Commands::Health => cmd_health(&rt, &config),
        Commands::Cleanup { emergency, force } => cmd_cleanup(&rt, &config, *emergency, *force),
        Commands::Queue { limit, sort, idle } => {
            cmd_queue(&rt, &config, *limit, parse_sort(sort.as_deref())?, *idle)
        }
        Commands::Enrich {
            dry_run,
            batches,
            no_artwork,
            force,
        } => {
            if batches.is_some() {
                config.enrichment.max_batches_per_pass = *batches;
            }
            if *no_artwork {
                config.enrichment.fetch_artwork = false;
            }
            cmd_enrich(&rt, &config, *dry_run, *force)
        }
        Commands::Ranks { sort, limit, save } => {
            cmd_ranks(&rt, &config, parse_sort(sort.as_deref())?, *limit, *save)
        }
        Commands::Reconcile => cmd_reconcile(&rt, &config),
        Commands::Clear { yes } => cmd_clear(&rt, &config, *yes),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open the service on the configured store and library export.
pub(crate) async fn open_service(config: &Config) -> anyhow::Result<RankService> {
    let export = config
        .library
        .export_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_EXPORT));
    let source = Arc::new(JsonLibrarySource::new(export));
    RankService::open(config, source)
        .await
        .context("Failed to open the cache store")
}

/// Parse an optional sort slug, defaulting to play count descending.
pub(crate) fn parse_sort(slug: Option<&str>) -> anyhow::Result<SortConfiguration> {
    match slug {
        None => Ok(SortConfiguration::default()),
        Some(slug) => SortConfiguration::from_slug(slug).with_context(|| {
            let known: Vec<String> = SortConfiguration::all().iter().map(|s| s.slug()).collect();
            format!("Unknown sort '{}'. Expected one of: {}", slug, known.join(", "))
        }),
    }
}

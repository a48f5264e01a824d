//! PlayRank command-line tool.
//!
//! Inspects and maintains the enrichment cache, queue and rank history of a
//! library export. See `playrank --help`.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use playrank::cli;

/// Log filter used when `RUST_LOG` is unset. Subsystems log under their own
/// targets rather than the crate path.
const DEFAULT_LOG_FILTER: &str =
    "playrank=info,cache=info,enrichment=info,history=info,library=info,maintenance=info,playcount=info,scheduler=info,store=info,events=warn";

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}

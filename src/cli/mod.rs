//! Command-line interface for playrank.
//!
//! Inspect and maintain the local cache, the enrichment queue and rank
//! history without the host application.

mod commands;

pub use commands::{Cli, Commands, run_command};

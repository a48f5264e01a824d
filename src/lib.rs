//! PlayRank - local cache and enrichment prioritization for a
//! play-count-ranked music library.
//!
//! The crate decides which library entries most urgently need catalog
//! enrichment, runs that enrichment with rate limiting and fuzzy matching,
//! keeps the results in size- and age-bounded caches, tracks rank movement
//! between views and reconciles locally counted plays against the system
//! play count. [`service::RankService`] is the entry point for host
//! applications; the `playrank` binary exposes the same operations on the
//! command line.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod history;
pub mod library;
pub mod maintenance;
pub mod model;
pub mod playback;
pub mod playcount;
pub mod scheduler;
pub mod service;
pub mod store;
#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
pub use service::RankService;

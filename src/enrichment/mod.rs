//! Enrichment: looking library entries up in a remote catalog.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - candidates, match outcomes, errors
//! - **API DTOs** (`musicbrainz/dto.rs`) - exact API response shapes
//! - **Adapters** - convert DTOs to domain models
//! - **Clients** - HTTP clients for MusicBrainz and the Cover Art Archive
//! - **Traits** (`traits.rs`) - the seams the executor depends on
//! - **Matcher** - fuzzy title/artist scoring
//! - **Executor** - batches, rate limiting and cache writes
//!
//! # Usage
//!
//! ```ignore
//! let executor = EnrichmentExecutor::new(
//!     scheduler, Arc::new(MusicBrainzClient::new()), Some(Arc::new(CoverArtClient::new())),
//!     enrichment_cache, artwork_cache, search_cache, events, clock, ExecutorConfig::default(),
//! );
//! let report = executor.run_pass().await;
//! ```

pub mod coverart;
pub mod domain;
pub mod executor;
pub mod matcher;
pub mod musicbrainz;
pub mod traits;

pub use coverart::{CoverArt, CoverArtClient, CoverSize};
pub use domain::{CandidateMatch, EnrichmentError, MatchOutcome};
pub use executor::{EnrichmentExecutor, ExecutorConfig, LookupOutcome, MatchSource, PassReport};
pub use matcher::{MATCH_THRESHOLD, best_match, normalize, similarity};
pub use musicbrainz::MusicBrainzClient;
pub use traits::{ArtworkFetcher, CatalogSearch};

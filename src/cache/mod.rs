//! Bounded cache family.
//!
//! Three durable caches share one contract ([`BoundedCache`]):
//! - [`EnrichmentCache`] - catalog payloads per entry
//! - [`ArtworkCache`] - image bytes per entry, byte-ceiling bound
//! - [`SearchCache`] - best catalog match per normalized query
//!
//! The cache is an optimization layer. Its total failure degrades to
//! "nothing was cached", never to an error.

mod artwork;
mod bounded;
mod enrichment;
mod search;

pub use artwork::{ArtworkBytes, ArtworkCache};
pub use bounded::{
    BoundedCache, CacheLimits, CacheValue, CodecError, MetadataRecord, PutOutcome,
    SIZE_SWEEP_TARGET, SweepReport, ValidationReport, Validity, decode_json, encode_json,
};
pub use enrichment::{CachedEnrichment, EnrichmentCache};
pub use search::{CachedSearchResult, SearchCache, normalize_query};

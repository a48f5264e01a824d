//! Internal domain models for catalog lookups.
//!
//! These types are OUR types - they don't change when external APIs change.
//! All external API responses get converted into these types via adapters.

use serde::{Deserialize, Serialize};

use crate::model::{EnrichmentPayload, LibraryEntry};

/// One result returned by a catalog search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    /// Catalog title
    pub title: String,
    /// Catalog artist credit
    pub artist: String,
    /// Album of the release the candidate was found on
    pub album: Option<String>,
    /// Metadata this candidate would contribute
    pub payload: EnrichmentPayload,
    /// Direct artwork URL, when the catalog returns one
    pub artwork_url: Option<String>,
}

impl CandidateMatch {
    /// Payload to store for `entry`: the candidate's metadata with the
    /// refined artist/album filled from the candidate itself.
    pub fn to_payload(&self) -> EnrichmentPayload {
        let mut payload = self.payload.clone();
        if payload.artist.is_none() && !self.artist.is_empty() {
            payload.artist = Some(self.artist.clone());
        }
        if payload.album.is_none() {
            payload.album = self.album.clone();
        }
        payload
    }

    /// Merge with what the entry already knows locally, local values first.
    pub fn merged_payload_for(&self, entry: &LibraryEntry) -> EnrichmentPayload {
        match &entry.enrichment {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.merge(&self.to_payload());
                merged
            }
            None => self.to_payload(),
        }
    }
}

/// Result of picking a candidate for an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// A candidate cleared the similarity threshold.
    Matched { candidate: CandidateMatch, score: f64 },
    /// Nothing cleared the threshold, or the search failed. Not an error.
    NoMatch,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Errors that can occur talking to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No matches found")]
    NoMatches,

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,
}

//! MusicBrainz API integration
//!
//! Acts as the remote catalog: recordings are searched by free-text query
//! and converted to [`CandidateMatch`](crate::enrichment::CandidateMatch)es.
//!
//! API docs: https://musicbrainz.org/doc/MusicBrainz_API

pub mod dto;
mod adapter;
mod client;

pub use adapter::{to_candidate, to_candidates};
pub use client::MusicBrainzClient;
pub(crate) use client::map_request_error;

//! Cover Art Archive integration
//!
//! Fetches album artwork from coverartarchive.org using MusicBrainz release
//! IDs. The bytes end up in the artwork cache. No API key required.

mod client;

pub use client::{CoverArt, CoverArtClient, CoverSize, MAX_IMAGE_BYTES};

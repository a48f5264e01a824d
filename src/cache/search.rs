//! Catalog-search cache: best-matched candidate per normalized query.
//!
//! Only accepted matches are cached. A miss or a failed search leaves
//! nothing behind so the next pass asks the catalog again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::bounded::{
    BoundedCache, CacheLimits, CacheValue, CodecError, PutOutcome, SweepReport, ValidationReport,
    decode_json, encode_json,
};
use crate::clock::SharedClock;
use crate::enrichment::CandidateMatch;
use crate::enrichment::matcher::normalize;
use crate::store::{KeyValueStore, Namespace};

/// Stored search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSearchResult {
    /// Normalized query the result was found for
    pub query: String,
    pub candidate: CandidateMatch,
    pub score: f64,
    pub captured_at: DateTime<Utc>,
}

impl CacheValue for CachedSearchResult {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode_json(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_json(bytes)
    }
}

/// Normalized query for a (title, artist) pair. Used as the cache key
/// input and as the free-text catalog query.
pub fn normalize_query(title: &str, artist: &str) -> String {
    let title = normalize(title);
    let artist = normalize(artist);
    match (title.is_empty(), artist.is_empty()) {
        (false, false) => format!("{} {}", title, artist),
        (false, true) => title,
        (true, false) => artist,
        (true, true) => String::new(),
    }
}

/// Store id for a normalized query: hex SHA-256, so arbitrary query text
/// never leaks into keys.
fn query_id(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct SearchCache {
    inner: BoundedCache<CachedSearchResult>,
    clock: SharedClock,
}

impl SearchCache {
    pub fn new(limits: CacheLimits, store: Arc<dyn KeyValueStore>, clock: SharedClock) -> Self {
        Self {
            inner: BoundedCache::new(Namespace::Search, limits, store, clock.clone()),
            clock,
        }
    }

    pub async fn put(&self, title: &str, artist: &str, candidate: &CandidateMatch, score: f64) -> PutOutcome {
        let query = normalize_query(title, artist);
        let record = CachedSearchResult {
            candidate: candidate.clone(),
            score,
            captured_at: self.clock.now(),
            query: query.clone(),
        };
        self.inner.put(&query_id(&query), &record).await
    }

    pub async fn get(&self, title: &str, artist: &str) -> Option<CachedSearchResult> {
        let query = normalize_query(title, artist);
        let record = self.inner.get(&query_id(&query)).await?;
        // Digest collisions are not a practical concern, but a mismatch
        // would mean someone else's data
        (record.query == query).then_some(record)
    }

    pub fn bounded(&self) -> &BoundedCache<CachedSearchResult> {
        &self.inner
    }

    pub async fn sweep(&self) -> SweepReport {
        self.inner.sweep().await
    }

    pub async fn validate(&self) -> ValidationReport {
        self.inner.validate().await
    }

    pub async fn clear(&self) {
        self.inner.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::enrichment::traits::mocks::candidate;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn cache() -> (SearchCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limits = CacheLimits {
            max_age: Duration::days(30),
            max_entries: 10,
            max_bytes: None,
        };
        (
            SearchCache::new(limits, Arc::new(MemoryStore::new()), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Hey, Jude! ", "The Beatles"), "hey jude the beatles");
        assert_eq!(normalize_query("Song", ""), "song");
        assert_eq!(normalize_query("", "!!"), "");
    }

    #[test]
    fn test_query_id_is_hex_sha256() {
        let id = query_id("abc");
        assert_eq!(id.len(), 64);
        assert!(id.starts_with("ba7816bf"));
    }

    #[tokio::test]
    async fn test_lookup_is_normalization_insensitive() {
        let (cache, _) = cache();
        let hit = candidate("Hey Jude", "The Beatles");
        cache.put("Hey Jude", "The Beatles", &hit, 0.95).await;

        let found = cache.get("hey  jude!", "the beatles").await.unwrap();
        assert_eq!(found.candidate, hit);
        assert_eq!(found.query, "hey jude the beatles");
    }

    #[tokio::test]
    async fn test_expiry() {
        let (cache, clock) = cache();
        cache.put("a", "b", &candidate("a", "b"), 1.0).await;
        clock.advance(Duration::days(31));
        assert!(cache.get("a", "b").await.is_none());
    }
}

//! Enrichment cache: one catalog-derived payload per library entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bounded::{
    BoundedCache, CacheLimits, CacheValue, CodecError, PutOutcome, SweepReport, ValidationReport,
    decode_json, encode_json,
};
use crate::clock::SharedClock;
use crate::model::{EnrichmentPayload, EntryId, LibraryEntry};
use crate::store::{KeyValueStore, Namespace};

/// Denormalized record stored per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEnrichment {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub payload: EnrichmentPayload,
    pub has_enhanced_data: bool,
    pub captured_at: DateTime<Utc>,
}

impl CacheValue for CachedEnrichment {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode_json(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_json(bytes)
    }
}

/// Bounded cache of [`CachedEnrichment`] records keyed by [`EntryId`].
pub struct EnrichmentCache {
    inner: BoundedCache<CachedEnrichment>,
    clock: SharedClock,
}

impl EnrichmentCache {
    pub fn new(limits: CacheLimits, store: Arc<dyn KeyValueStore>, clock: SharedClock) -> Self {
        Self {
            inner: BoundedCache::new(Namespace::Enrichment, limits, store, clock.clone()),
            clock,
        }
    }

    /// Cache `payload` for `entry`, snapshotting its local fields.
    pub async fn put(&self, entry: &LibraryEntry, payload: &EnrichmentPayload) -> PutOutcome {
        let record = CachedEnrichment {
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            has_enhanced_data: payload.has_enhanced_data(),
            payload: payload.clone(),
            captured_at: self.clock.now(),
        };
        self.inner.put(entry.id.as_str(), &record).await
    }

    /// Cached payload for `id`, if present and fresh.
    pub async fn get(&self, id: &EntryId) -> Option<EnrichmentPayload> {
        self.get_record(id).await.map(|r| r.payload)
    }

    pub async fn get_record(&self, id: &EntryId) -> Option<CachedEnrichment> {
        self.inner.get(id.as_str()).await
    }

    /// `entry` with its cached payload applied, when there is one.
    pub async fn apply(&self, entry: &LibraryEntry) -> Option<LibraryEntry> {
        self.get(&entry.id)
            .await
            .map(|payload| entry.with_enrichment(payload))
    }

    pub async fn contains(&self, id: &EntryId) -> bool {
        self.inner.contains(id.as_str()).await
    }

    pub fn bounded(&self) -> &BoundedCache<CachedEnrichment> {
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
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn cache() -> (EnrichmentCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limits = CacheLimits {
            max_age: Duration::days(90),
            max_entries: 100,
            max_bytes: None,
        };
        (
            EnrichmentCache::new(limits, Arc::new(MemoryStore::new()), clock.clone()),
            clock,
        )
    }

    fn payload() -> EnrichmentPayload {
        EnrichmentPayload {
            genre: Some("Shoegaze".to_string()),
            duration_secs: Some(312),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (cache, _) = cache();
        let entry = LibraryEntry::new("e1", "Only Shallow", "My Bloody Valentine", "Loveless", 12);

        assert!(cache.put(&entry, &payload()).await.is_stored());

        let record = cache.get_record(&entry.id).await.unwrap();
        assert_eq!(record.title, "Only Shallow");
        assert!(record.has_enhanced_data);
        assert_eq!(cache.get(&entry.id).await, Some(payload()));
    }

    #[tokio::test]
    async fn test_apply_returns_enriched_copy() {
        let (cache, _) = cache();
        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 1);
        assert!(cache.apply(&entry).await.is_none());

        cache.put(&entry, &payload()).await;
        let enriched = cache.apply(&entry).await.unwrap();
        assert!(enriched.is_enriched());
        assert_eq!(enriched, entry);
    }

    #[tokio::test]
    async fn test_expires_after_max_age() {
        let (cache, clock) = cache();
        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 1);
        cache.put(&entry, &payload()).await;

        clock.advance(Duration::days(90) + Duration::seconds(1));

        assert_eq!(cache.get(&entry.id).await, None);
        assert!(!cache.contains(&entry.id).await);
    }
}

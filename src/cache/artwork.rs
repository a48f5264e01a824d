//! Artwork cache.
//!
//! Raw image bytes per entry under an aggregate byte ceiling, plus a single
//! "currently displayed" slot used to restore the last-played track's art
//! across restarts. The slot has its own, shorter max age and is not part
//! of the ceiling.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::bounded::{
    BoundedCache, CacheLimits, CacheValue, CodecError, PutOutcome, SweepReport, ValidationReport,
    decode_json, encode_json,
};
use crate::clock::SharedClock;
use crate::model::EntryId;
use crate::store::{KeyValueStore, Namespace};

/// Image bytes as stored. Never transcoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkBytes(pub Vec<u8>);

impl CacheValue for ArtworkBytes {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.0.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Invalid("empty artwork payload".to_string()));
        }
        Ok(ArtworkBytes(bytes.to_vec()))
    }
}

const CURRENT_META: &str = "meta";
const CURRENT_DATA: &str = "data";

#[derive(Debug, Serialize, Deserialize)]
struct CurrentSlot {
    id: EntryId,
    stored_at: DateTime<Utc>,
    size: u64,
}

/// Bounded artwork cache with a "currently displayed" slot.
pub struct ArtworkCache {
    inner: BoundedCache<ArtworkBytes>,
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    current_max_age: Duration,
    current_lock: Mutex<()>,
}

impl ArtworkCache {
    pub fn new(
        limits: CacheLimits,
        current_max_age: Duration,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: BoundedCache::new(Namespace::Artwork, limits, store.clone(), clock.clone()),
            store,
            clock,
            current_max_age,
            current_lock: Mutex::new(()),
        }
    }

    pub async fn put(&self, id: &EntryId, bytes: Vec<u8>) -> PutOutcome {
        self.inner.put(id.as_str(), &ArtworkBytes(bytes)).await
    }

    pub async fn get(&self, id: &EntryId) -> Option<Vec<u8>> {
        self.inner.get(id.as_str()).await.map(|a| a.0)
    }

    pub async fn contains(&self, id: &EntryId) -> bool {
        self.inner.contains(id.as_str()).await
    }

    pub fn bounded(&self) -> &BoundedCache<ArtworkBytes> {
        &self.inner
    }

    pub async fn sweep(&self) -> SweepReport {
        let report = self.inner.sweep().await;
        self.expire_current().await;
        report
    }

    pub async fn validate(&self) -> ValidationReport {
        self.inner.validate().await
    }

    /// Clear both the bounded cache and the current slot.
    pub async fn clear(&self) {
        self.inner.clear().await;
        self.clear_current().await;
    }

    // ------------------------------------------------------------------
    // Currently displayed slot
    // ------------------------------------------------------------------

    /// Remember `bytes` as the artwork currently on screen.
    pub async fn put_current(&self, id: &EntryId, bytes: &[u8]) {
        let _guard = self.current_lock.lock().await;
        let slot = CurrentSlot {
            id: id.clone(),
            stored_at: self.clock.now(),
            size: bytes.len() as u64,
        };
        let meta = match encode_json(&slot) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(target: "cache", "Failed to encode current artwork slot: {}", e);
                return;
            }
        };

        // Data first: a crash in between leaves the old meta pointing at
        // mismatched bytes, which the size check in get_current rejects
        if let Err(e) = self
            .store
            .set(&Namespace::CurrentArtwork.key(CURRENT_DATA), bytes)
            .await
        {
            tracing::warn!(target: "cache", "Failed to write current artwork: {}", e);
            return;
        }
        if let Err(e) = self
            .store
            .set(&Namespace::CurrentArtwork.key(CURRENT_META), &meta)
            .await
        {
            tracing::warn!(target: "cache", "Failed to write current artwork metadata: {}", e);
        }
    }

    /// The artwork last displayed, if still fresh.
    pub async fn get_current(&self) -> Option<(EntryId, Vec<u8>)> {
        let _guard = self.current_lock.lock().await;
        let slot = self.read_current_slot().await?;

        if self.clock.now() - slot.stored_at > self.current_max_age {
            tracing::debug!(target: "cache", "Current artwork slot expired");
            self.delete_current().await;
            return None;
        }

        match self
            .store
            .get(&Namespace::CurrentArtwork.key(CURRENT_DATA))
            .await
        {
            Ok(Some(bytes)) if bytes.len() as u64 == slot.size && !bytes.is_empty() => {
                Some((slot.id, bytes))
            }
            Ok(_) => {
                tracing::warn!(target: "cache", "Current artwork slot is corrupted, removing");
                self.delete_current().await;
                None
            }
            Err(e) => {
                tracing::warn!(target: "cache", "Failed to read current artwork: {}", e);
                None
            }
        }
    }

    pub async fn clear_current(&self) {
        let _guard = self.current_lock.lock().await;
        self.delete_current().await;
    }

    async fn expire_current(&self) {
        let _guard = self.current_lock.lock().await;
        if let Some(slot) = self.read_current_slot().await
            && self.clock.now() - slot.stored_at > self.current_max_age
        {
            self.delete_current().await;
        }
    }

    async fn read_current_slot(&self) -> Option<CurrentSlot> {
        let key = Namespace::CurrentArtwork.key(CURRENT_META);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match decode_json::<CurrentSlot>(&bytes) {
                Ok(slot) => Some(slot),
                Err(e) => {
                    tracing::warn!(target: "cache", "Current artwork metadata is corrupted ({}), removing", e);
                    self.delete_current().await;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(target: "cache", "Failed to read current artwork metadata: {}", e);
                None
            }
        }
    }

    async fn delete_current(&self) {
        for part in [CURRENT_META, CURRENT_DATA] {
            if let Err(e) = self.store.delete(&Namespace::CurrentArtwork.key(part)).await {
                tracing::warn!(target: "cache", "Failed to delete current artwork {}: {}", part, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn cache(ceiling: u64) -> (ArtworkCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limits = CacheLimits {
            max_age: Duration::days(30),
            max_entries: 100,
            max_bytes: Some(ceiling),
        };
        let cache = ArtworkCache::new(limits, Duration::days(7), store.clone(), clock.clone());
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_aggregate_never_exceeds_ceiling() {
        let (cache, _, clock) = cache(1_000);
        for i in 0..30 {
            let size = 50 + (i * 37) % 200;
            cache.put(&EntryId::new(format!("e{}", i)), vec![1; size]).await;
            clock.advance(Duration::seconds(1));
            assert!(cache.bounded().total_bytes().await <= 1_000);
        }
        cache.sweep().await;
        assert!(cache.bounded().total_bytes().await <= 800);
    }

    #[tokio::test]
    async fn test_empty_bytes_are_corruption() {
        let (cache, store, _) = cache(1_000);
        let id = EntryId::new("e1");
        cache.put(&id, vec![1, 2, 3]).await;
        store.insert_raw(&Namespace::Artwork.key("e1"), Vec::new());
        assert_eq!(cache.get(&id).await, None);
    }

    #[tokio::test]
    async fn test_current_slot_round_trip_and_expiry() {
        let (cache, _, clock) = cache(1_000);
        let id = EntryId::new("now");
        cache.put_current(&id, &[9, 9, 9]).await;

        assert_eq!(cache.get_current().await, Some((id.clone(), vec![9, 9, 9])));

        clock.advance(Duration::days(7) + Duration::seconds(1));
        assert_eq!(cache.get_current().await, None);
    }

    #[tokio::test]
    async fn test_current_slot_not_counted_against_ceiling() {
        let (cache, _, _) = cache(10);
        cache.put_current(&EntryId::new("now"), &[0; 64]).await;
        assert!(cache.put(&EntryId::new("a"), vec![0; 10]).await.is_stored());
    }

    #[tokio::test]
    async fn test_clear_removes_current_slot() {
        let (cache, store, _) = cache(1_000);
        cache.put(&EntryId::new("a"), vec![1]).await;
        cache.put_current(&EntryId::new("a"), &[1]).await;

        cache.clear().await;

        assert!(store.is_empty());
        assert_eq!(cache.get_current().await, None);
    }

    #[tokio::test]
    async fn test_truncated_current_data_is_rejected() {
        let (cache, store, _) = cache(1_000);
        cache.put_current(&EntryId::new("a"), &[1, 2, 3, 4]).await;
        store.insert_raw(&Namespace::CurrentArtwork.key(CURRENT_DATA), vec![1, 2]);

        assert_eq!(cache.get_current().await, None);
        assert!(store.is_empty());
    }
}

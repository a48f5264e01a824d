//! Generic age-, count- and size-bounded cache over a [`KeyValueStore`].
//!
//! Values live under `namespace:id`; a per-namespace metadata index
//! (`index/namespace`) records `{id, stored_at, size}` for each value so
//! aggregate size and age checks never have to deserialize payloads.
//!
//! Every operation is best-effort. Store and codec failures are logged and
//! degrade to a miss or a skipped write; nothing here returns an error to
//! the caller.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::clock::SharedClock;
use crate::store::{KeyValueStore, Namespace};

/// Fraction of the byte ceiling a size sweep reclaims down to.
pub const SIZE_SWEEP_TARGET: f64 = 0.8;

/// Encode/decode failures of cached values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid payload: {0}")]
    Invalid(String),
}

/// A value that can be stored in a [`BoundedCache`].
pub trait CacheValue: Sized + Send + Sync {
    fn encode(&self) -> Result<Vec<u8>, CodecError>;
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// JSON encoding helper for [`CacheValue`] impls.
pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

/// JSON decoding helper for [`CacheValue`] impls.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Limits enforced by a cache instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheLimits {
    /// Entries older than this are logically absent
    pub max_age: Duration,
    /// Count cap enforced by sweeps
    pub max_entries: usize,
    /// Aggregate byte ceiling, enforced on put and by sweeps
    pub max_bytes: Option<u64>,
}

/// Metadata kept for every stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub stored_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataIndex {
    records: BTreeMap<String, MetadataRecord>,
}

impl MetadataIndex {
    fn total_bytes(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }
}

/// Result of a [`BoundedCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The write would exceed the byte ceiling and was skipped.
    CeilingReached { current: u64, incoming: u64, ceiling: u64 },
    /// Encoding or the store failed; nothing was cached.
    Failed,
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored)
    }
}

/// Classification of one stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Past max age but not yet swept
    Stale,
    /// Metadata present but payload missing or undecodable
    Corrupted,
}

/// Read-only classification of a whole cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: usize,
    pub stale: usize,
    pub corrupted: usize,
    pub total_bytes: u64,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.valid + self.stale + self.corrupted
    }

    pub fn corruption_ratio(&self) -> f64 {
        ratio(self.corrupted, self.total())
    }

    pub fn staleness_ratio(&self) -> f64 {
        ratio(self.stale, self.total())
    }

    /// Sum two reports.
    pub fn combine(self, other: ValidationReport) -> ValidationReport {
        ValidationReport {
            valid: self.valid + other.valid,
            stale: self.stale + other.stale,
            corrupted: self.corrupted + other.corrupted,
            total_bytes: self.total_bytes + other.total_bytes,
        }
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub over_count: usize,
    pub over_size: usize,
    pub remaining: usize,
    pub bytes_after: u64,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.over_count + self.over_size
    }
}

/// A durable bounded cache for one [`Namespace`].
pub struct BoundedCache<V> {
    namespace: Namespace,
    limits: CacheLimits,
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    /// Lazily loaded index; the lock also serializes read-modify-write
    index: Mutex<Option<MetadataIndex>>,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> BoundedCache<V> {
    pub fn new(
        namespace: Namespace,
        limits: CacheLimits,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            namespace,
            limits,
            store,
            clock,
            index: Mutex::new(None),
            _value: PhantomData,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Store `value` under `id`.
    pub async fn put(&self, id: &str, value: &V) -> PutOutcome {
        let bytes = match value.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(target: "cache", "[{}] Failed to encode {}: {}", self.namespace, id, e);
                return PutOutcome::Failed;
            }
        };
        let incoming = bytes.len() as u64;

        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;

        if let Some(ceiling) = self.limits.max_bytes {
            // The record being replaced does not count against the ceiling
            let replaced = index.records.get(id).map(|r| r.size).unwrap_or(0);
            let current = index.total_bytes().saturating_sub(replaced);
            if current + incoming > ceiling {
                tracing::info!(
                    target: "cache",
                    "[{}] Skipping {} ({} bytes): ceiling reached ({} of {} bytes used)",
                    self.namespace, id, incoming, current, ceiling
                );
                return PutOutcome::CeilingReached {
                    current,
                    incoming,
                    ceiling,
                };
            }
        }

        if let Err(e) = self.store.set(&self.namespace.key(id), &bytes).await {
            tracing::warn!(target: "cache", "[{}] Failed to write {}: {}", self.namespace, id, e);
            return PutOutcome::Failed;
        }

        index.records.insert(
            id.to_string(),
            MetadataRecord {
                id: id.to_string(),
                stored_at: self.clock.now(),
                size: incoming,
            },
        );
        self.persist(index).await;

        tracing::trace!(target: "cache", "[{}] Stored {} ({} bytes)", self.namespace, id, incoming);
        PutOutcome::Stored
    }

    /// Read the value under `id`.
    ///
    /// Expired and corrupted entries are deleted as a side effect and
    /// reported as a miss.
    pub async fn get(&self, id: &str) -> Option<V> {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;

        let record = index.records.get(id)?.clone();

        if self.is_expired(&record, self.limits.max_age) {
            tracing::debug!(target: "cache", "[{}] {} expired, removing", self.namespace, id);
            self.remove_ids(index, [id.to_string()]).await;
            return None;
        }

        match self.store.get(&self.namespace.key(id)).await {
            Ok(Some(bytes)) => match V::decode(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(target: "cache", "[{}] {} is corrupted ({}), removing", self.namespace, id, e);
                    self.remove_ids(index, [id.to_string()]).await;
                    None
                }
            },
            Ok(None) => {
                tracing::warn!(target: "cache", "[{}] {} has metadata but no payload, removing", self.namespace, id);
                self.remove_ids(index, [id.to_string()]).await;
                None
            }
            Err(e) => {
                // Transient store failure: report a miss, keep the record
                tracing::warn!(target: "cache", "[{}] Failed to read {}: {}", self.namespace, id, e);
                None
            }
        }
    }

    /// True when a non-expired metadata record exists for `id`. Does not
    /// read the payload.
    pub async fn contains(&self, id: &str) -> bool {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;
        index
            .records
            .get(id)
            .is_some_and(|r| !self.is_expired(r, self.limits.max_age))
    }

    /// Remove a single entry.
    pub async fn remove(&self, id: &str) {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;
        if index.records.contains_key(id) {
            self.remove_ids(index, [id.to_string()]).await;
        } else if let Err(e) = self.store.delete(&self.namespace.key(id)).await {
            tracing::warn!(target: "cache", "[{}] Failed to delete {}: {}", self.namespace, id, e);
        }
    }

    /// Number of tracked entries, including stale ones not yet swept.
    pub async fn len(&self) -> usize {
        let mut guard = self.index.lock().await;
        self.loaded(&mut guard).await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Aggregate tracked payload size.
    pub async fn total_bytes(&self) -> u64 {
        let mut guard = self.index.lock().await;
        self.loaded(&mut guard).await.total_bytes()
    }

    /// Snapshot of all metadata records, oldest first.
    pub async fn records(&self) -> Vec<MetadataRecord> {
        let mut guard = self.index.lock().await;
        let mut records: Vec<_> = self
            .loaded(&mut guard)
            .await
            .records
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Sweep with the configured max age.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_with_max_age(self.limits.max_age).await
    }

    /// Age pass, count pass and (with a byte ceiling) size pass.
    pub async fn sweep_with_max_age(&self, max_age: Duration) -> SweepReport {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;
        let mut report = SweepReport::default();

        // Pass 1: age
        let expired: Vec<String> = index
            .records
            .values()
            .filter(|r| self.is_expired(r, max_age))
            .map(|r| r.id.clone())
            .collect();
        report.expired = expired.len();
        for id in &expired {
            index.records.remove(id);
        }
        let mut doomed = expired;

        // Pass 2: count, oldest first
        if index.records.len() > self.limits.max_entries {
            let mut by_age: Vec<&MetadataRecord> = index.records.values().collect();
            by_age.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.id.cmp(&b.id)));
            let excess = index.records.len() - self.limits.max_entries;
            let oldest: Vec<String> = by_age.iter().take(excess).map(|r| r.id.clone()).collect();
            report.over_count = oldest.len();
            for id in &oldest {
                index.records.remove(id);
            }
            doomed.extend(oldest);
        }

        // Pass 3: size, keep newest while under the target
        if let Some(ceiling) = self.limits.max_bytes {
            let target = (ceiling as f64 * SIZE_SWEEP_TARGET) as u64;
            let mut newest_first: Vec<&MetadataRecord> = index.records.values().collect();
            newest_first.sort_by_key(|r| (Reverse(r.stored_at), r.id.clone()));

            let mut running = 0u64;
            let mut keep = HashSet::new();
            for record in newest_first {
                if running + record.size > target {
                    break;
                }
                running += record.size;
                keep.insert(record.id.clone());
            }

            let evicted: Vec<String> = index
                .records
                .keys()
                .filter(|id| !keep.contains(*id))
                .cloned()
                .collect();
            report.over_size = evicted.len();
            for id in &evicted {
                index.records.remove(id);
            }
            doomed.extend(evicted);
        }

        if !doomed.is_empty() {
            for id in &doomed {
                if let Err(e) = self.store.delete(&self.namespace.key(id)).await {
                    tracing::warn!(target: "cache", "[{}] Failed to delete {}: {}", self.namespace, id, e);
                }
            }
            self.persist(index).await;
        }

        report.remaining = index.records.len();
        report.bytes_after = index.total_bytes();

        if report.removed() > 0 {
            tracing::info!(
                target: "cache",
                "[{}] Sweep removed {} (expired {}, over count {}, over size {}), {} remain ({} bytes)",
                self.namespace,
                report.removed(),
                report.expired,
                report.over_count,
                report.over_size,
                report.remaining,
                report.bytes_after
            );
        }
        report
    }

    /// Classify every tracked entry. Never mutates.
    pub async fn validate(&self) -> ValidationReport {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;
        let mut report = ValidationReport {
            total_bytes: index.total_bytes(),
            ..Default::default()
        };

        for record in index.records.values() {
            match self.classify(record).await {
                Validity::Valid => report.valid += 1,
                Validity::Stale => report.stale += 1,
                Validity::Corrupted => report.corrupted += 1,
            }
        }
        report
    }

    async fn classify(&self, record: &MetadataRecord) -> Validity {
        let decodable = match self.store.get(&self.namespace.key(&record.id)).await {
            Ok(Some(bytes)) => V::decode(&bytes).is_ok(),
            Ok(None) => false,
            // Can't tell; don't report a store hiccup as corruption
            Err(_) => true,
        };
        if !decodable {
            Validity::Corrupted
        } else if self.is_expired(record, self.limits.max_age) {
            Validity::Stale
        } else {
            Validity::Valid
        }
    }

    /// Delete every tracked entry whose value is missing or undecodable.
    pub async fn purge_corrupted(&self) -> usize {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;

        let mut corrupted = Vec::new();
        for record in index.records.values() {
            if self.classify(record).await == Validity::Corrupted {
                corrupted.push(record.id.clone());
            }
        }
        let removed = corrupted.len();
        if removed > 0 {
            self.remove_ids(index, corrupted).await;
            tracing::warn!(target: "cache", "[{}] Purged {} corrupted entries", self.namespace, removed);
        }
        removed
    }

    /// Delete values in the namespace that have no metadata record.
    pub async fn remove_orphans(&self) -> usize {
        let mut guard = self.index.lock().await;
        let index = self.loaded(&mut guard).await;

        let keys = match self.store.keys_with_prefix(&self.namespace.prefix()).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(target: "cache", "[{}] Failed to list keys: {}", self.namespace, e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let Some(id) = self.namespace.id_of(&key) else {
                continue;
            };
            if index.records.contains_key(id) {
                continue;
            }
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(target: "cache", "[{}] Failed to delete orphan {}: {}", self.namespace, key, e),
            }
        }

        if removed > 0 {
            tracing::info!(target: "cache", "[{}] Removed {} orphaned values", self.namespace, removed);
        }
        removed
    }

    /// Delete every key in the namespace and the metadata index.
    pub async fn clear(&self) {
        let mut guard = self.index.lock().await;

        match self.store.keys_with_prefix(&self.namespace.prefix()).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.store.delete(&key).await {
                        tracing::warn!(target: "cache", "[{}] Failed to delete {}: {}", self.namespace, key, e);
                    }
                }
            }
            Err(e) => tracing::warn!(target: "cache", "[{}] Failed to list keys: {}", self.namespace, e),
        }
        if let Err(e) = self.store.delete(&self.namespace.index_key()).await {
            tracing::warn!(target: "cache", "[{}] Failed to delete index: {}", self.namespace, e);
        }

        *guard = Some(MetadataIndex::default());
        tracing::info!(target: "cache", "[{}] Cleared", self.namespace);
    }

    // ------------------------------------------------------------------
    // Internals (callers hold the index lock)
    // ------------------------------------------------------------------

    fn is_expired(&self, record: &MetadataRecord, max_age: Duration) -> bool {
        self.clock.now() - record.stored_at > max_age
    }

    async fn loaded<'a>(&self, slot: &'a mut Option<MetadataIndex>) -> &'a mut MetadataIndex {
        if slot.is_none() {
            *slot = Some(self.read_index().await);
        }
        slot.get_or_insert_with(MetadataIndex::default)
    }

    async fn read_index(&self) -> MetadataIndex {
        match self.store.get(&self.namespace.index_key()).await {
            Ok(Some(bytes)) => match decode_json::<MetadataIndex>(&bytes) {
                Ok(index) => index,
                Err(e) => {
                    // Values become orphans; emergency cleanup reclaims them
                    tracing::warn!(target: "cache", "[{}] Metadata index is corrupted ({}), starting empty", self.namespace, e);
                    MetadataIndex::default()
                }
            },
            Ok(None) => MetadataIndex::default(),
            Err(e) => {
                tracing::warn!(target: "cache", "[{}] Failed to read metadata index: {}", self.namespace, e);
                MetadataIndex::default()
            }
        }
    }

    async fn persist(&self, index: &MetadataIndex) {
        let bytes = match encode_json(index) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(target: "cache", "[{}] Failed to encode metadata index: {}", self.namespace, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&self.namespace.index_key(), &bytes).await {
            tracing::warn!(target: "cache", "[{}] Failed to write metadata index: {}", self.namespace, e);
        }
    }

    async fn remove_ids(&self, index: &mut MetadataIndex, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            index.records.remove(&id);
            if let Err(e) = self.store.delete(&self.namespace.key(&id)).await {
                tracing::warn!(target: "cache", "[{}] Failed to delete {}: {}", self.namespace, id, e);
            }
        }
        self.persist(index).await;
    }
}

//! Rank history.
//!
//! Keeps up to [`HistoryLimits::max_snapshots`] ranked snapshots per sort
//! configuration and diffs the current order against the most recent one.
//! One store key holds the snapshot list for one configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::{decode_json, encode_json};
use crate::clock::SharedClock;
use crate::model::{EntryId, LibraryEntry, SortConfiguration};
use crate::store::{KeyValueStore, Namespace, StoreKey};

/// Snapshot cap and retention window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryLimits {
    pub max_snapshots: usize,
    pub retention: Duration,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_snapshots: 10,
            retention: Duration::days(30),
        }
    }
}

/// Positions of every entry at one point in time, under one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSnapshot {
    pub taken_at: DateTime<Utc>,
    pub sort: SortConfiguration,
    /// 1-based ranks
    pub ranks: HashMap<EntryId, u32>,
}

impl RankSnapshot {
    /// Rank every entry by its position in `ordered`.
    pub fn from_order(ordered: &[LibraryEntry], sort: SortConfiguration, taken_at: DateTime<Utc>) -> Self {
        let ranks = ordered
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id.clone(), i as u32 + 1))
            .collect();
        Self { taken_at, sort, ranks }
    }
}

/// Movement of one entry relative to the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankChange {
    /// Rose by n places
    Up(u32),
    /// Dropped by n places
    Down(u32),
    Unchanged,
    /// Not in the previous snapshot
    New,
}

impl fmt::Display for RankChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankChange::Up(n) => write!(f, "+{}", n),
            RankChange::Down(n) => write!(f, "-{}", n),
            RankChange::Unchanged => f.write_str("="),
            RankChange::New => f.write_str("new"),
        }
    }
}

/// Compare current positions against `previous`.
pub fn diff_ranks(ordered: &[LibraryEntry], previous: &RankSnapshot) -> HashMap<EntryId, RankChange> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let current = i as u32 + 1;
            let change = match previous.ranks.get(&entry.id) {
                None => RankChange::New,
                Some(&prior) if prior < current => RankChange::Down(current - prior),
                Some(&prior) if prior > current => RankChange::Up(prior - current),
                Some(_) => RankChange::Unchanged,
            };
            (entry.id.clone(), change)
        })
        .collect()
}

/// Storage statistics for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    /// Snapshot-list keys present
    pub lists: usize,
    pub snapshots: usize,
    /// Lists that failed to decode
    pub undecodable: usize,
}

/// Durable rank history across all sort configurations.
pub struct RankHistoryTracker {
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    limits: HistoryLimits,
    lock: Mutex<()>,
}

impl RankHistoryTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: SharedClock, limits: HistoryLimits) -> Self {
        Self {
            store,
            clock,
            limits,
            lock: Mutex::new(()),
        }
    }

    /// Append a snapshot of `ordered` for `sort`, evicting the oldest past
    /// the cap.
    pub async fn save_snapshot(&self, ordered: &[LibraryEntry], sort: SortConfiguration) {
        let _guard = self.lock.lock().await;
        let mut snapshots = self.load(sort).await.unwrap_or_default();

        snapshots.push(RankSnapshot::from_order(ordered, sort, self.clock.now()));
        if snapshots.len() > self.limits.max_snapshots {
            let excess = snapshots.len() - self.limits.max_snapshots;
            snapshots.drain(..excess);
        }

        self.write(sort, &snapshots).await;
        tracing::debug!(
            target: "history",
            "Saved {} snapshot ({} entries, {} kept)",
            sort,
            ordered.len(),
            snapshots.len()
        );
    }

    /// Rank movement of every entry in `ordered` since the last snapshot.
    ///
    /// Empty when no snapshot exists yet, so nothing is flagged on a first
    /// view. Entries that dropped out of the list are not reported.
    pub async fn rank_changes(
        &self,
        ordered: &[LibraryEntry],
        sort: SortConfiguration,
    ) -> HashMap<EntryId, RankChange> {
        match self.latest_snapshot(sort).await {
            Some(previous) => diff_ranks(ordered, &previous),
            None => HashMap::new(),
        }
    }

    pub async fn latest_snapshot(&self, sort: SortConfiguration) -> Option<RankSnapshot> {
        let _guard = self.lock.lock().await;
        self.load(sort)
            .await
            .and_then(|snapshots| snapshots.into_iter().max_by_key(|s| s.taken_at))
    }

    pub async fn snapshot_count(&self, sort: SortConfiguration) -> usize {
        let _guard = self.lock.lock().await;
        self.load(sort).await.map(|s| s.len()).unwrap_or(0)
    }

    /// Drop snapshots older than the retention window. Returns how many
    /// were removed.
    pub async fn cleanup_old_snapshots(&self) -> usize {
        self.cleanup_older_than(self.limits.retention).await
    }

    pub async fn cleanup_older_than(&self, retention: Duration) -> usize {
        let _guard = self.lock.lock().await;
        let cutoff = self.clock.now() - retention;
        let mut removed = 0;

        for sort in SortConfiguration::all() {
            let Some(snapshots) = self.load(sort).await else {
                continue;
            };
            let before = snapshots.len();
            let kept: Vec<RankSnapshot> = snapshots
                .into_iter()
                .filter(|s| s.taken_at >= cutoff)
                .collect();
            if kept.len() == before {
                continue;
            }
            removed += before - kept.len();
            if kept.is_empty() {
                self.delete(sort).await;
            } else {
                self.write(sort, &kept).await;
            }
        }

        if removed > 0 {
            tracing::info!(target: "history", "Purged {} rank snapshots older than {} days", removed, retention.num_days());
        }
        removed
    }

    /// Delete every snapshot list.
    pub async fn clear_all(&self) {
        let _guard = self.lock.lock().await;
        for sort in SortConfiguration::all() {
            self.delete(sort).await;
        }
        tracing::info!(target: "history", "Cleared rank history");
    }

    pub async fn stats(&self) -> HistoryStats {
        let _guard = self.lock.lock().await;
        let mut stats = HistoryStats::default();
        for sort in SortConfiguration::all() {
            match self.store.get(&list_key(sort)).await {
                Ok(Some(bytes)) => {
                    stats.lists += 1;
                    match decode_json::<Vec<RankSnapshot>>(&bytes) {
                        Ok(snapshots) => stats.snapshots += snapshots.len(),
                        Err(_) => stats.undecodable += 1,
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(target: "history", "Failed to read {} history: {}", sort, e),
            }
        }
        stats
    }

    /// `None` when nothing is stored or the list is unreadable.
    async fn load(&self, sort: SortConfiguration) -> Option<Vec<RankSnapshot>> {
        match self.store.get(&list_key(sort)).await {
            Ok(Some(bytes)) => match decode_json(&bytes) {
                Ok(snapshots) => Some(snapshots),
                Err(e) => {
                    tracing::warn!(target: "history", "{} history is corrupted ({}), ignoring", sort, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(target: "history", "Failed to read {} history: {}", sort, e);
                None
            }
        }
    }

    async fn write(&self, sort: SortConfiguration, snapshots: &[RankSnapshot]) {
        let bytes = match encode_json(&snapshots) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(target: "history", "Failed to encode {} history: {}", sort, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&list_key(sort), &bytes).await {
            tracing::warn!(target: "history", "Failed to write {} history: {}", sort, e);
        }
    }

    async fn delete(&self, sort: SortConfiguration) {
        if let Err(e) = self.store.delete(&list_key(sort)).await {
            tracing::warn!(target: "history", "Failed to delete {} history: {}", sort, e);
        }
    }
}

fn list_key(sort: SortConfiguration) -> StoreKey {
    Namespace::RankHistory.key(&sort.slug())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn entries(ids: &[&str]) -> Vec<LibraryEntry> {
        ids.iter()
            .map(|id| LibraryEntry::new(*id, *id, "artist", "album", 0))
            .collect()
    }

    fn tracker() -> (RankHistoryTracker, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tracker = RankHistoryTracker::new(store.clone(), clock.clone(), HistoryLimits::default());
        (tracker, store, clock)
    }

    #[tokio::test]
    async fn test_cold_start_reports_nothing() {
        let (tracker, _, _) = tracker();
        let changes = tracker
            .rank_changes(&entries(&["A", "B"]), SortConfiguration::default())
            .await;
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_rank_changes() {
        let (tracker, _, clock) = tracker();
        let sort = SortConfiguration::default();
        tracker.save_snapshot(&entries(&["A", "B", "C"]), sort).await;
        clock.advance(Duration::minutes(1));

        let changes = tracker.rank_changes(&entries(&["B", "A", "D"]), sort).await;

        assert_eq!(changes.len(), 3);
        assert_eq!(changes[&EntryId::new("A")], RankChange::Down(1));
        assert_eq!(changes[&EntryId::new("B")], RankChange::Up(1));
        assert_eq!(changes[&EntryId::new("D")], RankChange::New);
        assert!(!changes.contains_key(&EntryId::new("C")));
    }

    #[tokio::test]
    async fn test_compares_against_most_recent() {
        let (tracker, _, clock) = tracker();
        let sort = SortConfiguration::default();
        tracker.save_snapshot(&entries(&["A", "B"]), sort).await;
        clock.advance(Duration::minutes(1));
        tracker.save_snapshot(&entries(&["B", "A"]), sort).await;

        let changes = tracker.rank_changes(&entries(&["B", "A"]), sort).await;
        assert_eq!(changes[&EntryId::new("A")], RankChange::Unchanged);
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let (tracker, _, clock) = tracker();
        let sort = SortConfiguration::default();
        for _ in 0..12 {
            tracker.save_snapshot(&entries(&["A"]), sort).await;
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(tracker.snapshot_count(sort).await, 10);
    }

    #[tokio::test]
    async fn test_configurations_are_independent() {
        let (tracker, _, _) = tracker();
        let by_title = SortConfiguration::from_slug("title_asc").unwrap();
        tracker.save_snapshot(&entries(&["A"]), SortConfiguration::default()).await;
        assert!(tracker.rank_changes(&entries(&["A"]), by_title).await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_purges_old_snapshots() {
        let (tracker, store, clock) = tracker();
        let sort = SortConfiguration::default();
        tracker.save_snapshot(&entries(&["A"]), sort).await;
        clock.advance(Duration::days(20));
        tracker.save_snapshot(&entries(&["A"]), sort).await;
        clock.advance(Duration::days(15));

        assert_eq!(tracker.cleanup_old_snapshots().await, 1);
        assert_eq!(tracker.snapshot_count(sort).await, 1);

        clock.advance(Duration::days(30));
        assert_eq!(tracker.cleanup_old_snapshots().await, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_list_is_ignored_and_replaced() {
        let (tracker, store, _) = tracker();
        let sort = SortConfiguration::default();
        store.insert_raw(&list_key(sort), b"{broken".to_vec());

        assert_eq!(tracker.stats().await.undecodable, 1);
        assert!(tracker.rank_changes(&entries(&["A"]), sort).await.is_empty());

        tracker.save_snapshot(&entries(&["A"]), sort).await;
        assert_eq!(tracker.snapshot_count(sort).await, 1);
        assert_eq!(tracker.stats().await.undecodable, 0);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (tracker, store, _) = tracker();
        for sort in SortConfiguration::all() {
            tracker.save_snapshot(&entries(&["A"]), sort).await;
        }
        assert_eq!(tracker.stats().await.lists, 8);
        tracker.clear_all().await;
        assert!(store.is_empty());
    }

    #[test]
    fn test_rank_change_display() {
        assert_eq!(RankChange::Up(3).to_string(), "+3");
        assert_eq!(RankChange::Down(2).to_string(), "-2");
        assert_eq!(RankChange::Unchanged.to_string(), "=");
        assert_eq!(RankChange::New.to_string(), "new");
    }
}

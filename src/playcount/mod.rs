//! Play-count reconciliation.
//!
//! The system media index only updates play counts lazily, so plays seen
//! by this process are tracked as a local increment on top of the last
//! observed system count (the baseline). When the system catches up, the
//! catch-up is folded out of the local increment so a single play is never
//! counted twice:
//!
//! ```text
//! displayed = system + local_increment
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::{decode_json, encode_json};
use crate::events::{EventChannel, LibraryEvent};
use crate::model::{EntryId, LibraryEntry};
use crate::playback::CurrentPlaybackObserver;
use crate::store::{KeyValueStore, Namespace};

/// Durable per-entry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPlayCountState {
    /// Plays detected locally and not yet reflected in the system count
    pub local_increment: u32,
    /// System count observed at the last reconciliation
    pub baseline: u32,
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No state, or the system count has not moved
    Unchanged,
    /// The system count rose; `folded` local plays were absorbed
    CaughtUp { delta: u32, folded: u32 },
    /// The system count went backwards. The local increment is kept and
    /// the baseline reset.
    Anomaly { previous_baseline: u32 },
}

/// Pure reconciliation step.
pub fn reconcile_counts(system: u32, state: LocalPlayCountState) -> (LocalPlayCountState, ReconcileOutcome) {
    if system > state.baseline {
        let delta = system - state.baseline;
        let folded = delta.min(state.local_increment);
        let next = LocalPlayCountState {
            local_increment: state.local_increment - folded,
            baseline: system,
        };
        (next, ReconcileOutcome::CaughtUp { delta, folded })
    } else if system < state.baseline {
        let next = LocalPlayCountState {
            local_increment: state.local_increment,
            baseline: system,
        };
        (
            next,
            ReconcileOutcome::Anomaly {
                previous_baseline: state.baseline,
            },
        )
    } else {
        (state, ReconcileOutcome::Unchanged)
    }
}

/// Counts from a bulk reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub tracked: usize,
    pub caught_up: usize,
    pub anomalies: usize,
}

/// Owns the `playcount` key range.
///
/// Once an entry has been played locally its state is kept even after the
/// local increment drops to zero, so the baseline is still there to flag a
/// later drop in the system count. `clear_all` is the only way to forget it.
pub struct PlayCountReconciler {
    store: Arc<dyn KeyValueStore>,
    events: EventChannel,
    observer: Arc<dyn CurrentPlaybackObserver>,
    lock: Mutex<()>,
}

impl PlayCountReconciler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        events: EventChannel,
        observer: Arc<dyn CurrentPlaybackObserver>,
    ) -> Self {
        Self {
            store,
            events,
            observer,
            lock: Mutex::new(()),
        }
    }

    /// Stored state for `id`, if any.
    pub async fn state(&self, id: &EntryId) -> Option<LocalPlayCountState> {
        let _guard = self.lock.lock().await;
        self.load(id).await
    }

    /// Reconcile `entry`'s system count against its stored state.
    pub async fn reconcile(&self, entry: &LibraryEntry) -> ReconcileOutcome {
        let _guard = self.lock.lock().await;
        let Some(state) = self.load(&entry.id).await else {
            return ReconcileOutcome::Unchanged;
        };

        let (next, outcome) = reconcile_counts(entry.play_count, state);
        match outcome {
            ReconcileOutcome::Unchanged => return outcome,
            ReconcileOutcome::CaughtUp { delta, folded } => {
                tracing::debug!(
                    target: "playcount",
                    "{}: system +{}, folded {} local plays ({} left)",
                    entry.id, delta, folded, next.local_increment
                );
            }
            ReconcileOutcome::Anomaly { previous_baseline } => {
                tracing::warn!(
                    target: "playcount",
                    "{}: system play count went backwards ({} -> {}), keeping {} local plays",
                    entry.id, previous_baseline, entry.play_count, next.local_increment
                );
                self.events.publish(LibraryEvent::ReconciliationAnomaly {
                    id: entry.id.clone(),
                    previous_baseline,
                    system: entry.play_count,
                });
            }
        }

        self.save(&entry.id, next).await;
        outcome
    }

    /// Reconcile every entry that has local state.
    pub async fn reconcile_all(&self, entries: &[LibraryEntry]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for entry in entries {
            match self.reconcile(entry).await {
                ReconcileOutcome::Unchanged => {}
                ReconcileOutcome::CaughtUp { .. } => summary.caught_up += 1,
                ReconcileOutcome::Anomaly { .. } => summary.anomalies += 1,
            }
        }
        summary.tracked = self.tracked_count().await;
        summary
    }

    /// Record one full natural play of `entry`. Returns the new displayed
    /// play count.
    pub async fn increment_local_play_count(&self, entry: &LibraryEntry) -> u32 {
        let displayed = {
            let _guard = self.lock.lock().await;
            let mut state = self.load(&entry.id).await.unwrap_or(LocalPlayCountState {
                local_increment: 0,
                baseline: entry.play_count,
            });
            state.local_increment = state.local_increment.saturating_add(1);
            self.save(&entry.id, state).await;
            entry.displayed_play_count(state.local_increment)
        };

        tracing::debug!(target: "playcount", "{}: play completed, displayed {}", entry.id, displayed);
        self.events.publish(LibraryEvent::PlayCompleted {
            id: entry.id.clone(),
            displayed_play_count: displayed,
        });
        displayed
    }

    /// Record a completed play of whatever is playing now.
    pub async fn record_completed_play(&self) -> Option<u32> {
        let now_playing = self.observer.now_playing()?;
        Some(self.increment_local_play_count(&now_playing.entry).await)
    }

    pub async fn displayed_play_count(&self, entry: &LibraryEntry) -> u32 {
        let local = self
            .state(&entry.id)
            .await
            .map(|s| s.local_increment)
            .unwrap_or(0);
        entry.displayed_play_count(local)
    }

    /// Non-zero local increments for `ids`.
    pub async fn local_increments<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a EntryId>,
    ) -> HashMap<EntryId, u32> {
        let _guard = self.lock.lock().await;
        let mut increments = HashMap::new();
        for id in ids {
            if let Some(state) = self.load(id).await
                && state.local_increment > 0
            {
                increments.insert(id.clone(), state.local_increment);
            }
        }
        increments
    }

    /// Number of entries with stored state.
    pub async fn tracked_count(&self) -> usize {
        match self.store.keys_with_prefix(&Namespace::PlayCount.prefix()).await {
            Ok(keys) => keys.len(),
            Err(e) => {
                tracing::warn!(target: "playcount", "Failed to list play-count keys: {}", e);
                0
            }
        }
    }

    /// Forget every local increment.
    pub async fn clear_all(&self) {
        let _guard = self.lock.lock().await;
        match self.store.keys_with_prefix(&Namespace::PlayCount.prefix()).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.store.delete(&key).await {
                        tracing::warn!(target: "playcount", "Failed to delete {}: {}", key, e);
                    }
                }
            }
            Err(e) => tracing::warn!(target: "playcount", "Failed to list play-count keys: {}", e),
        }
        tracing::info!(target: "playcount", "Cleared local play counts");
    }

    async fn load(&self, id: &EntryId) -> Option<LocalPlayCountState> {
        let key = Namespace::PlayCount.key(id.as_str());
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match decode_json(&bytes) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!(target: "playcount", "{}: stored state is corrupted ({}), dropping", id, e);
                    if let Err(e) = self.store.delete(&key).await {
                        tracing::warn!(target: "playcount", "Failed to delete {}: {}", key, e);
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(target: "playcount", "{}: failed to read state: {}", id, e);
                None
            }
        }
    }

    async fn save(&self, id: &EntryId, state: LocalPlayCountState) {
        let key = Namespace::PlayCount.key(id.as_str());
        let bytes = match encode_json(&state) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(target: "playcount", "{}: failed to encode state: {}", id, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&key, &bytes).await {
            tracing::warn!(target: "playcount", "{}: failed to persist state: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{NowPlaying, PlaybackState};
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn reconciler() -> (PlayCountReconciler, Arc<MemoryStore>, EventChannel, Arc<PlaybackState>) {
        let store = Arc::new(MemoryStore::new());
        let events = EventChannel::new();
        let playback = PlaybackState::shared();
        let reconciler = PlayCountReconciler::new(store.clone(), events.clone(), playback.clone());
        (reconciler, store, events, playback)
    }

    #[test]
    fn test_fold() {
        let (next, outcome) = reconcile_counts(
            12,
            LocalPlayCountState {
                local_increment: 3,
                baseline: 10,
            },
        );
        assert_eq!(next.local_increment, 1);
        assert_eq!(next.baseline, 12);
        assert_eq!(outcome, ReconcileOutcome::CaughtUp { delta: 2, folded: 2 });
    }

    #[test]
    fn test_fold_never_goes_negative() {
        let (next, _) = reconcile_counts(
            20,
            LocalPlayCountState {
                local_increment: 3,
                baseline: 10,
            },
        );
        assert_eq!(next.local_increment, 0);
    }

    #[test]
    fn test_anomaly_keeps_local_and_resets_baseline() {
        let state = LocalPlayCountState {
            local_increment: 4,
            baseline: 10,
        };
        let (next, outcome) = reconcile_counts(7, state);
        assert_eq!(next, LocalPlayCountState { local_increment: 4, baseline: 7 });
        assert_eq!(outcome, ReconcileOutcome::Anomaly { previous_baseline: 10 });
    }

    #[test]
    fn test_no_change() {
        let state = LocalPlayCountState {
            local_increment: 2,
            baseline: 5,
        };
        assert_eq!(reconcile_counts(5, state), (state, ReconcileOutcome::Unchanged));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Increment,
        /// System count rises by this much, then reconcile
        Reconcile(u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Increment), (0u32..5).prop_map(Op::Reconcile)]
    }

    proptest! {
        #[test]
        fn displayed_is_monotonic_when_system_never_decreases(
            start in 0u32..1000,
            ops in prop::collection::vec(op_strategy(), 0..60),
        ) {
            let mut system = start;
            let mut state = LocalPlayCountState { local_increment: 0, baseline: start };
            let mut displayed = system + state.local_increment;

            for op in ops {
                match op {
                    Op::Increment => state.local_increment += 1,
                    Op::Reconcile(rise) => {
                        system += rise;
                        let (next, outcome) = reconcile_counts(system, state);
                        let anomaly = matches!(outcome, ReconcileOutcome::Anomaly { .. });
                        prop_assert!(!anomaly, "rising system count reported an anomaly");
                        state = next;
                    }
                }
                let now = system + state.local_increment;
                prop_assert!(now >= displayed);
                displayed = now;
            }
        }
    }

    #[tokio::test]
    async fn test_increment_then_reconcile() {
        let (reconciler, store, events, _) = reconciler();
        let mut rx = events.subscribe();
        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 10);

        assert_eq!(reconciler.increment_local_play_count(&entry).await, 11);
        assert_eq!(reconciler.increment_local_play_count(&entry).await, 12);
        assert_eq!(
            rx.recv().await.unwrap(),
            LibraryEvent::PlayCompleted {
                id: EntryId::new("e1"),
                displayed_play_count: 11
            }
        );

        // System catches up by one
        let refreshed = LibraryEntry::new("e1", "Song", "Artist", "Album", 11);
        let outcome = reconciler.reconcile(&refreshed).await;
        assert_eq!(outcome, ReconcileOutcome::CaughtUp { delta: 1, folded: 1 });
        assert_eq!(reconciler.displayed_play_count(&refreshed).await, 12);

        // Fully caught up: only the baseline is left
        let refreshed = LibraryEntry::new("e1", "Song", "Artist", "Album", 12);
        reconciler.reconcile(&refreshed).await;
        assert_eq!(
            reconciler.state(&refreshed.id).await,
            Some(LocalPlayCountState { local_increment: 0, baseline: 12 })
        );
        assert_eq!(store.len(), 1);
        assert_eq!(reconciler.displayed_play_count(&refreshed).await, 12);
        assert!(reconciler.local_increments([&refreshed.id]).await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_after_full_catch_up_is_an_anomaly() {
        let (reconciler, _, events, _) = reconciler();
        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 10);
        reconciler.increment_local_play_count(&entry).await;
        reconciler
            .reconcile(&LibraryEntry::new("e1", "Song", "Artist", "Album", 11))
            .await;

        let mut rx = events.subscribe();
        let resynced = LibraryEntry::new("e1", "Song", "Artist", "Album", 3);
        assert_eq!(
            reconciler.reconcile(&resynced).await,
            ReconcileOutcome::Anomaly { previous_baseline: 11 }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            LibraryEvent::ReconciliationAnomaly {
                id: EntryId::new("e1"),
                previous_baseline: 11,
                system: 3
            }
        );
        assert_eq!(reconciler.displayed_play_count(&resynced).await, 3);
    }

    #[tokio::test]
    async fn test_reconcile_without_state_is_noop() {
        let (reconciler, store, _, _) = reconciler();
        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 10);
        assert_eq!(reconciler.reconcile(&entry).await, ReconcileOutcome::Unchanged);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_anomaly_publishes_event() {
        let (reconciler, _, events, _) = reconciler();
        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 10);
        reconciler.increment_local_play_count(&entry).await;

        let mut rx = events.subscribe();
        let resynced = LibraryEntry::new("e1", "Song", "Artist", "Album", 4);
        reconciler.reconcile(&resynced).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            LibraryEvent::ReconciliationAnomaly {
                id: EntryId::new("e1"),
                previous_baseline: 10,
                system: 4
            }
        );
        assert_eq!(
            reconciler.state(&entry.id).await,
            Some(LocalPlayCountState { local_increment: 1, baseline: 4 })
        );
    }

    #[tokio::test]
    async fn test_record_completed_play_uses_observer() {
        let (reconciler, _, _, playback) = reconciler();
        assert_eq!(reconciler.record_completed_play().await, None);

        let entry = LibraryEntry::new("e1", "Song", "Artist", "Album", 3);
        playback.set(Some(NowPlaying {
            entry: entry.clone(),
            is_from_library_source: true,
        }));
        assert_eq!(reconciler.record_completed_play().await, Some(4));
    }

    #[tokio::test]
    async fn test_local_increments_and_clear() {
        let (reconciler, store, _, _) = reconciler();
        let a = LibraryEntry::new("a", "A", "x", "x", 1);
        let b = LibraryEntry::new("b", "B", "x", "x", 1);
        reconciler.increment_local_play_count(&a).await;

        let increments = reconciler.local_increments([&a.id, &b.id]).await;
        assert_eq!(increments.len(), 1);
        assert_eq!(increments[&a.id], 1);

        reconciler.clear_all().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_state_is_dropped() {
        let (reconciler, store, _, _) = reconciler();
        store.insert_raw(&Namespace::PlayCount.key("e1"), b"nope".to_vec());
        assert_eq!(reconciler.state(&EntryId::new("e1")).await, None);
        assert!(store.is_empty());
    }
}

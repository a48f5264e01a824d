//! Enrichment priority scheduler.
//!
//! Maintains a prioritized queue over the whole library, re-derived from
//! what is playing, the active sort, play counts and the enriched set:
//!
//! | Tier       | Contents                                               |
//! |------------|--------------------------------------------------------|
//! | urgent     | the now-playing entry, if not enriched                 |
//! | high       | top `window` of the active sort                        |
//! | medium     | top and bottom `window` of every other sort            |
//! | low        | remaining entries with a non-zero displayed play count |
//! | background | zero-play entries, only while idle                     |
//!
//! The queue is rebuilt from scratch when any input changes, at most once
//! per cooldown. A rebuild owed during the cooldown is performed by the
//! next batch pull. All state sits behind one `parking_lot::Mutex`; every
//! call is short and synchronous.

mod queue;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::clock::SharedClock;
use crate::model::{EntryId, LibraryEntry, SortConfiguration, sort_with_increments};
use crate::playback::CurrentPlaybackObserver;

pub use queue::{QueueItem, QueueReason, Tier, TierCounts};

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Size of the top/bottom windows per sort configuration
    pub window: usize,
    /// Minimum time between input-triggered rebuilds
    pub rebuild_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window: 50,
            rebuild_cooldown: Duration::seconds(1),
        }
    }
}

#[derive(Default)]
struct State {
    library: Vec<LibraryEntry>,
    library_ids: HashSet<EntryId>,
    active_sort: SortConfiguration,
    idle: bool,
    local_counts: HashMap<EntryId, u32>,
    enriched: HashSet<EntryId>,
    queue: Vec<QueueItem>,
    rebuild_owed: bool,
    last_rebuild: Option<DateTime<Utc>>,
    rebuilds: u64,
    now_playing: Option<EntryId>,
    last_enrichment_at: Option<DateTime<Utc>>,
    seq: u64,
}

impl State {
    fn is_done(&self, entry: &LibraryEntry) -> bool {
        entry.is_enriched() || self.enriched.contains(&entry.id)
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn sort_queue(&mut self) {
        self.queue.sort_by_key(|item| item.order_key());
    }
}

/// Read-only view of the scheduler for reporting.
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub items: Vec<QueueItem>,
    pub tier_counts: TierCounts,
    pub enriched: usize,
    pub library_size: usize,
    pub active_sort: SortConfiguration,
    pub idle: bool,
    pub last_enrichment_at: Option<DateTime<Utc>>,
}

pub struct PriorityScheduler {
    state: Mutex<State>,
    observer: Arc<dyn CurrentPlaybackObserver>,
    clock: SharedClock,
    config: SchedulerConfig,
}

impl PriorityScheduler {
    pub fn new(
        observer: Arc<dyn CurrentPlaybackObserver>,
        clock: SharedClock,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            observer,
            clock,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Replace the library snapshot.
    pub fn set_library_contents(&self, entries: Vec<LibraryEntry>) {
        let mut state = self.state.lock();
        state.library_ids = entries.iter().map(|e| e.id.clone()).collect();
        state.library = entries;
        tracing::debug!(target: "scheduler", "Library contents set ({} entries)", state.library.len());
        self.invalidate(&mut state);
    }

    pub fn set_active_sort(&self, sort: SortConfiguration) {
        let mut state = self.state.lock();
        if state.active_sort == sort {
            return;
        }
        state.active_sort = sort;
        self.invalidate(&mut state);
    }

    pub fn set_idle(&self, idle: bool) {
        let mut state = self.state.lock();
        if state.idle == idle {
            return;
        }
        state.idle = idle;
        self.invalidate(&mut state);
    }

    /// Local play increments used for displayed play counts.
    pub fn set_local_play_counts(&self, counts: HashMap<EntryId, u32>) {
        let mut state = self.state.lock();
        if state.local_counts == counts {
            return;
        }
        state.local_counts = counts;
        self.invalidate(&mut state);
    }

    /// Re-read the playback observer.
    ///
    /// If the rebuild has to wait for the cooldown, the new now-playing
    /// entry is queued as urgent right away.
    pub fn notify_now_playing_changed(&self) {
        let now_playing = self.observer.now_playing();
        let mut state = self.state.lock();

        let id = now_playing.as_ref().map(|np| np.entry.id.clone());
        if state.now_playing == id {
            return;
        }
        state.now_playing = id;

        let rebuilt = self.invalidate(&mut state);
        if rebuilt {
            return;
        }
        if let Some(np) = now_playing
            && !state.is_done(&np.entry)
        {
            let reason = urgent_reason(&state, &np.entry, np.is_from_library_source);
            let enqueued_at = self.clock.now();
            let seq = state.next_seq();
            state.queue.retain(|item| item.entry.id != np.entry.id);
            state.queue.push(QueueItem {
                entry: np.entry,
                tier: Tier::Urgent,
                reason,
                enqueued_at,
                seq,
            });
            state.sort_queue();
        }
    }

    // ------------------------------------------------------------------
    // Batches and completion
    // ------------------------------------------------------------------

    /// The first `n` queued entries. Does not change enrichment state.
    pub fn next_batch(&self, n: usize) -> Vec<LibraryEntry> {
        self.next_batch_where(n, |_| true)
    }

    /// The first `n` queued entries accepted by `filter`.
    pub fn next_batch_where(&self, n: usize, filter: impl Fn(&QueueItem) -> bool) -> Vec<LibraryEntry> {
        let mut state = self.state.lock();
        if state.rebuild_owed {
            self.rebuild(&mut state);
        }
        state
            .queue
            .iter()
            .filter(|item| filter(item))
            .take(n)
            .map(|item| item.entry.clone())
            .collect()
    }

    /// Remove `id` from the queue and record it as enriched. Idempotent.
    /// Returns true the first time.
    pub fn mark_enriched(&self, id: &EntryId) -> bool {
        let mut state = self.state.lock();
        state.queue.retain(|item| &item.entry.id != id);
        let newly = state.enriched.insert(id.clone());
        if newly {
            tracing::trace!(target: "scheduler", "Marked {} enriched", id);
        }
        newly
    }

    /// Seed the enriched set, e.g. from the enrichment cache at startup.
    pub fn mark_all_enriched(&self, ids: impl IntoIterator<Item = EntryId>) {
        let mut state = self.state.lock();
        let mut added = 0;
        for id in ids {
            if state.enriched.insert(id) {
                added += 1;
            }
        }
        if added > 0 {
            let State { queue, enriched, .. } = &mut *state;
            queue.retain(|item| !enriched.contains(&item.entry.id));
        }
    }

    pub fn is_enriched(&self, id: &EntryId) -> bool {
        self.state.lock().enriched.contains(id)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn enriched_count(&self) -> usize {
        self.state.lock().enriched.len()
    }

    pub fn queue_len(&self) -> usize {
        let mut state = self.state.lock();
        if state.rebuild_owed {
            self.rebuild(&mut state);
        }
        state.queue.len()
    }

    pub fn tier_counts(&self) -> TierCounts {
        let mut state = self.state.lock();
        if state.rebuild_owed {
            self.rebuild(&mut state);
        }
        count_tiers(&state.queue)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let mut state = self.state.lock();
        if state.rebuild_owed {
            self.rebuild(&mut state);
        }
        SchedulerSnapshot {
            items: state.queue.clone(),
            tier_counts: count_tiers(&state.queue),
            enriched: state.enriched.len(),
            library_size: state.library.len(),
            active_sort: state.active_sort,
            idle: state.idle,
            last_enrichment_at: state.last_enrichment_at,
        }
    }

    /// Number of rebuilds performed so far.
    pub fn rebuild_count(&self) -> u64 {
        self.state.lock().rebuilds
    }

    pub fn last_enrichment_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_enrichment_at
    }

    /// Stamp the end of an enrichment pass.
    pub fn record_enrichment_pass(&self) {
        let now = self.clock.now();
        self.state.lock().last_enrichment_at = Some(now);
    }

    // ------------------------------------------------------------------
    // Rebuild
    // ------------------------------------------------------------------

    /// Mark a rebuild owed and run it if the cooldown allows. Returns true
    /// if it ran.
    fn invalidate(&self, state: &mut State) -> bool {
        state.rebuild_owed = true;
        let now = self.clock.now();
        let cooled = state
            .last_rebuild
            .is_none_or(|last| now - last >= self.config.rebuild_cooldown);
        if cooled {
            self.rebuild(state);
        } else {
            tracing::trace!(target: "scheduler", "Rebuild deferred (cooldown)");
        }
        cooled
    }

    fn rebuild(&self, state: &mut State) {
        let now = self.clock.now();
        let window = self.config.window;
        let active = state.active_sort;

        let active_order: Vec<LibraryEntry> =
            sort_with_increments(&state.library, active, &state.local_counts)
                .into_iter()
                .cloned()
                .collect();

        // Top/bottom windows of every other configuration
        let library = &state.library;
        let local_counts = &state.local_counts;
        let other_windows: Vec<(SortConfiguration, Vec<EntryId>, Vec<EntryId>)> =
            SortConfiguration::all()
                .into_par_iter()
                .filter(|sort| *sort != active)
                .map(|sort| {
                    let sorted = sort_with_increments(library, sort, local_counts);
                    let top = sorted.iter().take(window).map(|e| e.id.clone()).collect();
                    let bottom = sorted
                        .iter()
                        .skip(sorted.len().saturating_sub(window))
                        .map(|e| e.id.clone())
                        .collect();
                    (sort, top, bottom)
                })
                .collect();

        let mut builder = QueueBuilder {
            state: &*state,
            items: Vec::new(),
            queued: HashSet::new(),
            now,
            seq: state.seq,
        };

        if let Some(np) = self.observer.now_playing() {
            let reason = urgent_reason(state, &np.entry, np.is_from_library_source);
            builder.push(np.entry, Tier::Urgent, reason);
        }

        for entry in active_order.iter().take(window) {
            builder.push(entry.clone(), Tier::High, QueueReason::TopOfActiveSort);
        }

        let by_id: HashMap<&EntryId, &LibraryEntry> =
            state.library.iter().map(|e| (&e.id, e)).collect();
        for (sort, top, bottom) in &other_windows {
            for id in top {
                if let Some(entry) = by_id.get(id) {
                    builder.push((*entry).clone(), Tier::Medium, QueueReason::TopOfSort(*sort));
                }
            }
            for id in bottom {
                if let Some(entry) = by_id.get(id) {
                    builder.push((*entry).clone(), Tier::Medium, QueueReason::BottomOfSort(*sort));
                }
            }
        }

        for entry in &active_order {
            let local = state.local_counts.get(&entry.id).copied().unwrap_or(0);
            if entry.displayed_play_count(local) > 0 {
                builder.push(entry.clone(), Tier::Low, QueueReason::Played);
            } else if state.idle {
                builder.push(entry.clone(), Tier::Background, QueueReason::Idle);
            }
        }

        let QueueBuilder { mut items, seq, .. } = builder;
        items.sort_by_key(|item| item.order_key());

        state.queue = items;
        state.seq = seq;
        state.rebuild_owed = false;
        state.last_rebuild = Some(now);
        state.rebuilds += 1;

        let counts = count_tiers(&state.queue);
        tracing::debug!(
            target: "scheduler",
            "Rebuilt queue: {} items (urgent {}, high {}, medium {}, low {}, background {})",
            counts.total(),
            counts.urgent,
            counts.high,
            counts.medium,
            counts.low,
            counts.background
        );
    }
}

/// Appends items tier by tier, skipping enriched and already-queued ids.
struct QueueBuilder<'a> {
    state: &'a State,
    items: Vec<QueueItem>,
    queued: HashSet<EntryId>,
    now: DateTime<Utc>,
    seq: u64,
}

impl QueueBuilder<'_> {
    fn push(&mut self, entry: LibraryEntry, tier: Tier, reason: QueueReason) {
        if self.state.is_done(&entry) || self.queued.contains(&entry.id) {
            return;
        }
        self.seq += 1;
        self.queued.insert(entry.id.clone());
        self.items.push(QueueItem {
            entry,
            tier,
            reason,
            enqueued_at: self.now,
            seq: self.seq,
        });
    }
}

fn urgent_reason(state: &State, entry: &LibraryEntry, is_from_library_source: bool) -> QueueReason {
    if is_from_library_source && state.library_ids.contains(&entry.id) {
        QueueReason::NowPlaying
    } else {
        QueueReason::NowPlayingOutsideLibrary
    }
}

fn count_tiers(queue: &[QueueItem]) -> TierCounts {
    let mut counts = TierCounts::default();
    for item in queue {
        counts.add(item.tier);
    }
    counts
}

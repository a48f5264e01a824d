//! Collaborator-facing facade.
//!
//! [`RankService`] wires the store, caches, scheduler, rank history,
//! reconciler and coordinator together and exposes the operations the
//! surrounding application calls. It owns the now-playing state and the
//! current library snapshot; everything else is delegated.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::cache::{ArtworkCache, EnrichmentCache, PutOutcome, SearchCache};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::enrichment::{ArtworkFetcher, CatalogSearch, EnrichmentExecutor, ExecutorConfig};
use crate::error::{Error, Result, ResultExt};
use crate::events::{EventChannel, LibraryEvent};
use crate::history::{RankChange, RankHistoryTracker};
use crate::library::{LibraryAccessor, LibrarySource};
use crate::maintenance::{CacheCoordinator, CleanupReport, HealthReport};
use crate::model::{EnrichmentPayload, EntryId, LibraryEntry, SortConfiguration, sort_with_increments};
use crate::playback::{NowPlaying, PlaybackState};
use crate::playcount::{PlayCountReconciler, ReconcileOutcome, ReconcileSummary};
use crate::scheduler::{PriorityScheduler, SchedulerSnapshot};
use crate::store::{KeyValueStore, SqliteStore, db_url};

/// Result of [`RankService::refresh_library`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryRefresh {
    pub entries: usize,
    /// Entries already enriched from the cache
    pub cached: usize,
    pub reconciled: ReconcileSummary,
}

pub struct RankService {
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    events: EventChannel,
    playback: Arc<PlaybackState>,
    library: LibraryAccessor,
    snapshot: RwLock<Arc<Vec<LibraryEntry>>>,
    active_sort: RwLock<SortConfiguration>,
    scheduler: Arc<PriorityScheduler>,
    enrichment_cache: Arc<EnrichmentCache>,
    artwork_cache: Arc<ArtworkCache>,
    search_cache: Arc<SearchCache>,
    history: Arc<RankHistoryTracker>,
    reconciler: PlayCountReconciler,
    coordinator: CacheCoordinator,
    executor_config: ExecutorConfig,
}

impl RankService {
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        library: Arc<dyn LibrarySource>,
        clock: SharedClock,
    ) -> Self {
        let events = EventChannel::new();
        let playback = PlaybackState::shared();

        let enrichment_cache = Arc::new(EnrichmentCache::new(
            config.cache.enrichment_limits(),
            store.clone(),
            clock.clone(),
        ));
        let artwork_cache = Arc::new(ArtworkCache::new(
            config.cache.artwork_limits(),
            config.cache.current_artwork_max_age(),
            store.clone(),
            clock.clone(),
        ));
        let search_cache = Arc::new(SearchCache::new(
            config.cache.search_limits(),
            store.clone(),
            clock.clone(),
        ));
        let history = Arc::new(RankHistoryTracker::new(
            store.clone(),
            clock.clone(),
            config.cache.history_limits(),
        ));
        let scheduler = Arc::new(PriorityScheduler::new(
            playback.clone(),
            clock.clone(),
            config.scheduler.to_config(),
        ));
        let reconciler = PlayCountReconciler::new(store.clone(), events.clone(), playback.clone());
        let coordinator = CacheCoordinator::new(
            enrichment_cache.clone(),
            artwork_cache.clone(),
            search_cache.clone(),
            history.clone(),
            store.clone(),
            clock.clone(),
            config.maintenance.to_config(),
        );

        Self {
            library: LibraryAccessor::new(library, events.clone()),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            active_sort: RwLock::new(SortConfiguration::default()),
            store,
            clock,
            events,
            playback,
            scheduler,
            enrichment_cache,
            artwork_cache,
            search_cache,
            history,
            reconciler,
            coordinator,
            executor_config: config.enrichment.to_config(),
        }
    }

    /// Open the configured SQLite store and build a service on the wall
    /// clock.
    pub async fn open(config: &Config, library: Arc<dyn LibrarySource>) -> Result<Self> {
        let path = config.store.resolved_database_path();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).with_context(format!("creating {}", dir.display()))?;
        }
        let store = SqliteStore::open(&db_url(Some(&path)))
            .await
            .with_context(format!("opening {}", path.display()))?;
        Ok(Self::new(config, Arc::new(store), library, crate::clock::system()))
    }

    /// Build an executor sharing this service's caches and scheduler.
    pub fn enrichment_executor(
        &self,
        catalog: Arc<dyn CatalogSearch>,
        artwork: Option<Arc<dyn ArtworkFetcher>>,
    ) -> EnrichmentExecutor {
        EnrichmentExecutor::new(
            self.scheduler.clone(),
            catalog,
            artwork,
            self.enrichment_cache.clone(),
            self.artwork_cache.clone(),
            self.search_cache.clone(),
            self.events.clone(),
            self.clock.clone(),
            self.executor_config,
        )
    }

    // ------------------------------------------------------------------
    // Library
    // ------------------------------------------------------------------

    /// Refetch the library, reconcile play counts and rebuild the queue.
    pub async fn refresh_library(&self) -> Result<LibraryRefresh> {
        let entries = self.library.refresh().await?;
        let reconciled = self.reconciler.reconcile_all(&entries).await;
        let cached = self.set_library_contents(entries.as_ref().clone()).await;
        Ok(LibraryRefresh {
            entries: entries.len(),
            cached,
            reconciled,
        })
    }

    /// Replace the library snapshot. Entries with a fresh enrichment cache
    /// record are marked enriched; returns how many.
    pub async fn set_library_contents(&self, entries: Vec<LibraryEntry>) -> usize {
        let increments = self.reconciler.local_increments(entries.iter().map(|e| &e.id)).await;

        let mut cached = Vec::new();
        for entry in &entries {
            if self.enrichment_cache.contains(&entry.id).await {
                cached.push(entry.id.clone());
            }
        }
        let count = cached.len();

        self.scheduler.mark_all_enriched(cached);
        self.scheduler.set_local_play_counts(increments);
        self.scheduler.set_library_contents(entries.clone());
        *self.snapshot.write() = Arc::new(entries);
        count
    }

    /// Current library snapshot.
    pub fn library_entries(&self) -> Arc<Vec<LibraryEntry>> {
        self.snapshot.read().clone()
    }

    /// The snapshot with cached enrichment applied.
    pub async fn enriched_entries(&self) -> Vec<LibraryEntry> {
        let entries = self.library_entries();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            match self.enrichment_cache.apply(entry).await {
                Some(enriched) => out.push(enriched),
                None => out.push(entry.clone()),
            }
        }
        out
    }

    fn find_entry(&self, id: &EntryId) -> Option<LibraryEntry> {
        self.snapshot.read().iter().find(|e| &e.id == id).cloned()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    pub fn next_enrichment_batch(&self, n: usize) -> Vec<LibraryEntry> {
        self.scheduler.next_batch(n)
    }

    pub fn mark_enriched(&self, id: &EntryId) -> bool {
        self.scheduler.mark_enriched(id)
    }

    /// Update what is playing. `None` means nothing is.
    pub fn set_currently_playing(&self, entry: Option<LibraryEntry>, is_from_library_source: bool) {
        let now_playing = entry.map(|entry| NowPlaying {
            entry,
            is_from_library_source,
        });
        if self.playback.set(now_playing) {
            self.scheduler.notify_now_playing_changed();
        }
    }

    pub fn set_active_sort_configuration(&self, sort: SortConfiguration) {
        *self.active_sort.write() = sort;
        self.scheduler.set_active_sort(sort);
    }

    pub fn active_sort_configuration(&self) -> SortConfiguration {
        *self.active_sort.read()
    }

    pub fn set_idle(&self, idle: bool) {
        self.scheduler.set_idle(idle);
    }

    pub fn scheduler_snapshot(&self) -> SchedulerSnapshot {
        self.scheduler.snapshot()
    }

    // ------------------------------------------------------------------
    // Caches
    // ------------------------------------------------------------------

    pub async fn cached_enrichment(&self, id: &EntryId) -> Option<EnrichmentPayload> {
        self.enrichment_cache.get(id).await
    }

    /// Store enrichment obtained outside the executor and mark the entry
    /// enriched. The entry must be in the current snapshot.
    pub async fn put_enrichment(&self, id: &EntryId, payload: &EnrichmentPayload) -> Result<PutOutcome> {
        let entry = self
            .find_entry(id)
            .ok_or_else(|| Error::entry_not_found(id.as_str()))?;
        let outcome = self.enrichment_cache.put(&entry, payload).await;
        if outcome.is_stored() && self.scheduler.mark_enriched(id) {
            self.events.publish(LibraryEvent::EntryEnriched { id: id.clone() });
        }
        Ok(outcome)
    }

    pub async fn cached_artwork_bytes(&self, id: &EntryId) -> Option<Vec<u8>> {
        self.artwork_cache.get(id).await
    }

    pub async fn put_artwork_bytes(&self, id: &EntryId, bytes: Vec<u8>) -> PutOutcome {
        self.artwork_cache.put(id, bytes).await
    }

    /// Remember the artwork currently on screen.
    pub async fn set_current_artwork(&self, id: &EntryId, bytes: &[u8]) {
        self.artwork_cache.put_current(id, bytes).await;
    }

    pub async fn current_artwork(&self) -> Option<(EntryId, Vec<u8>)> {
        self.artwork_cache.get_current().await
    }

    // ------------------------------------------------------------------
    // Rank history
    // ------------------------------------------------------------------

    /// Order `entries` under `sort` by displayed play count.
    pub async fn ranked(&self, entries: &[LibraryEntry], sort: SortConfiguration) -> Vec<LibraryEntry> {
        let increments = self.reconciler.local_increments(entries.iter().map(|e| &e.id)).await;
        sort_with_increments(entries, sort, &increments)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Rank movement of `ordered` since the last snapshot for `sort`.
    ///
    /// The slice order is the ranking; nothing is re-sorted here.
    pub async fn rank_changes(
        &self,
        ordered: &[LibraryEntry],
        sort: SortConfiguration,
    ) -> HashMap<EntryId, RankChange> {
        self.history.rank_changes(ordered, sort).await
    }

    /// Record `ordered` as the current ranking for `sort`.
    pub async fn save_rank_snapshot(&self, ordered: &[LibraryEntry], sort: SortConfiguration) {
        self.history.save_snapshot(ordered, sort).await;
    }

    // ------------------------------------------------------------------
    // Play counts
    // ------------------------------------------------------------------

    pub async fn reconcile_play_count(&self, entry: &LibraryEntry) -> ReconcileOutcome {
        let outcome = self.reconciler.reconcile(entry).await;
        if outcome != ReconcileOutcome::Unchanged {
            self.refresh_local_play_counts().await;
        }
        outcome
    }

    /// Count a full play of the now-playing entry.
    pub async fn record_completed_play(&self) -> Option<u32> {
        let displayed = self.reconciler.record_completed_play().await?;
        self.refresh_local_play_counts().await;
        Some(displayed)
    }

    pub async fn displayed_play_count(&self, entry: &LibraryEntry) -> u32 {
        self.reconciler.displayed_play_count(entry).await
    }

    async fn refresh_local_play_counts(&self) {
        let entries = self.library_entries();
        let increments = self.reconciler.local_increments(entries.iter().map(|e| &e.id)).await;
        self.scheduler.set_local_play_counts(increments);
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    pub async fn run_cleanup_if_due(&self) -> Option<CleanupReport> {
        self.coordinator.run_cleanup_if_due().await
    }

    pub fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }

    pub async fn health_report(&self) -> HealthReport {
        self.coordinator.health_report().await
    }

    /// Drop every cache, snapshot and local play count.
    pub async fn clear_all(&self) {
        self.enrichment_cache.clear().await;
        self.artwork_cache.clear().await;
        self.search_cache.clear().await;
        self.history.clear_all().await;
        self.reconciler.clear_all().await;
        tracing::info!(target: "maintenance", "Cleared all cached data ({} keys left)", self.key_count().await);
    }

    async fn key_count(&self) -> usize {
        self.store.key_count().await.unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }
}

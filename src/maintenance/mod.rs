//! Cache management coordinator.
//!
//! Decides when the bounded caches and rank history get swept, runs
//! periodic and emergency cleanups, and reports an aggregate health score.
//! The last-cleanup timestamp is persisted so the 24 h cadence survives
//! restarts.

mod health;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::cache::{
    ArtworkCache, EnrichmentCache, SearchCache, SweepReport, ValidationReport, decode_json,
    encode_json,
};
use crate::clock::SharedClock;
use crate::history::RankHistoryTracker;
use crate::store::{KeyValueStore, Namespace, StoreKey};

pub use health::{CacheStats, HealthIssues, HealthReport, HealthThresholds, detect_issues, health_score};

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaintenanceConfig {
    pub cleanup_interval: Duration,
    pub key_soft_threshold: usize,
    pub key_hard_ceiling: usize,
    /// Aggregate corrupted-entry ratio that forces a cleanup
    pub corruption_threshold: f64,
    pub emergency_enrichment_age: Duration,
    pub emergency_artwork_age: Duration,
    pub emergency_search_age: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::hours(24),
            key_soft_threshold: 5_000,
            key_hard_ceiling: 10_000,
            corruption_threshold: 0.10,
            emergency_enrichment_age: Duration::days(30),
            emergency_artwork_age: Duration::days(7),
            emergency_search_age: Duration::days(7),
        }
    }
}

impl MaintenanceConfig {
    fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            key_soft_threshold: self.key_soft_threshold,
            key_hard_ceiling: self.key_hard_ceiling,
            corruption_threshold: self.corruption_threshold,
            cleanup_interval: self.cleanup_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    Periodic,
    Emergency,
}

impl std::fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupKind::Periodic => f.write_str("periodic"),
            CleanupKind::Emergency => f.write_str("emergency"),
        }
    }
}

/// What a cleanup did.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupReport {
    pub kind: CleanupKind,
    pub enrichment: SweepReport,
    pub artwork: SweepReport,
    pub search: SweepReport,
    pub snapshots_removed: usize,
    pub orphans_removed: usize,
    /// Entries whose value was missing or undecodable
    pub corrupted_removed: usize,
    /// Validation of all caches after the sweep
    pub after: ValidationReport,
    pub finished_at: DateTime<Utc>,
}

impl CleanupReport {
    pub fn entries_removed(&self) -> usize {
        self.corrupted_removed
            + self.enrichment.removed()
            + self.artwork.removed()
            + self.search.removed()
    }
}

pub struct CacheCoordinator {
    enrichment: Arc<EnrichmentCache>,
    artwork: Arc<ArtworkCache>,
    search: Arc<SearchCache>,
    history: Arc<RankHistoryTracker>,
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    config: MaintenanceConfig,
    /// One cleanup at a time
    running: Mutex<()>,
}

impl CacheCoordinator {
    pub fn new(
        enrichment: Arc<EnrichmentCache>,
        artwork: Arc<ArtworkCache>,
        search: Arc<SearchCache>,
        history: Arc<RankHistoryTracker>,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            enrichment,
            artwork,
            search,
            history,
            store,
            clock,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// When the last cleanup of either kind finished.
    pub async fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        match self.store.get(&last_cleanup_key()).await {
            Ok(Some(bytes)) => match decode_json(&bytes) {
                Ok(at) => Some(at),
                Err(e) => {
                    tracing::warn!(target: "maintenance", "Last-cleanup timestamp is corrupted: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(target: "maintenance", "Failed to read last-cleanup timestamp: {}", e);
                None
            }
        }
    }

    /// Total keys in the store.
    pub async fn key_count(&self) -> usize {
        match self.store.key_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(target: "maintenance", "Failed to count keys: {}", e);
                0
            }
        }
    }

    /// Validate everything and gather counts.
    pub async fn collect_stats(&self) -> CacheStats {
        CacheStats {
            enrichment: self.enrichment.validate().await,
            artwork: self.artwork.validate().await,
            search: self.search.validate().await,
            history: self.history.stats().await,
            key_count: self.key_count().await,
            last_cleanup: self.last_cleanup().await,
        }
    }

    /// Issues found in the current stats.
    pub async fn current_issues(&self) -> HealthIssues {
        let stats = self.collect_stats().await;
        detect_issues(&stats, self.clock.now(), &self.config.thresholds())
    }

    /// True if a cleanup was never run, is overdue, the key count is over
    /// the hard ceiling or the corruption ratio is over the threshold.
    pub async fn should_run_cleanup(&self) -> bool {
        self.current_issues().await.intersects(HealthIssues::NEEDS_CLEANUP)
    }

    /// Purge corrupted entries, sweep every cache with its own limits and
    /// purge old snapshots.
    pub async fn periodic_cleanup(&self) -> CleanupReport {
        let _running = self.running.lock().await;
        tracing::info!(target: "maintenance", "Running periodic cleanup");

        let corrupted_removed = self.purge_corrupted().await;
        let enrichment = self.enrichment.sweep().await;
        let artwork = self.artwork.sweep().await;
        let search = self.search.sweep().await;
        let snapshots_removed = self.history.cleanup_old_snapshots().await;

        self.finish(
            CleanupKind::Periodic,
            enrichment,
            artwork,
            search,
            snapshots_removed,
            0,
            corrupted_removed,
        )
        .await
    }

    /// Purge corrupted entries, sweep with tightened max ages and remove
    /// orphaned values.
    pub async fn emergency_cleanup(&self) -> CleanupReport {
        let _running = self.running.lock().await;
        tracing::warn!(target: "maintenance", "Running emergency cleanup");

        let corrupted_removed = self.purge_corrupted().await;

        let enrichment = self
            .enrichment
            .bounded()
            .sweep_with_max_age(self.config.emergency_enrichment_age)
            .await;
        let artwork = self
            .artwork
            .bounded()
            .sweep_with_max_age(self.config.emergency_artwork_age)
            .await;
        let search = self
            .search
            .bounded()
            .sweep_with_max_age(self.config.emergency_search_age)
            .await;
        let snapshots_removed = self.history.cleanup_old_snapshots().await;

        let orphans_removed = self.enrichment.bounded().remove_orphans().await
            + self.artwork.bounded().remove_orphans().await
            + self.search.bounded().remove_orphans().await;

        self.finish(
            CleanupKind::Emergency,
            enrichment,
            artwork,
            search,
            snapshots_removed,
            orphans_removed,
            corrupted_removed,
        )
        .await
    }

    async fn purge_corrupted(&self) -> usize {
        self.enrichment.bounded().purge_corrupted().await
            + self.artwork.bounded().purge_corrupted().await
            + self.search.bounded().purge_corrupted().await
    }

    /// Run a cleanup if one is due: emergency when the key count is over
    /// the hard ceiling, periodic otherwise.
    pub async fn run_cleanup_if_due(&self) -> Option<CleanupReport> {
        let issues = self.current_issues().await;
        if !issues.intersects(HealthIssues::NEEDS_CLEANUP) {
            tracing::debug!(target: "maintenance", "Cleanup not due");
            return None;
        }
        let report = if issues.intersects(HealthIssues::NEEDS_EMERGENCY) {
            self.emergency_cleanup().await
        } else {
            self.periodic_cleanup().await
        };
        Some(report)
    }

    pub async fn health_score(&self) -> f64 {
        let stats = self.collect_stats().await;
        health_score(&stats, self.clock.now(), &self.config.thresholds())
    }

    pub async fn health_report(&self) -> HealthReport {
        let stats = self.collect_stats().await;
        let now = self.clock.now();
        let thresholds = self.config.thresholds();
        let issues = detect_issues(&stats, now, &thresholds);
        HealthReport {
            score: health_score(&stats, now, &thresholds),
            issues,
            recommendations: issues
                .recommendations()
                .into_iter()
                .map(String::from)
                .collect(),
            stats,
        }
    }

    async fn finish(
        &self,
        kind: CleanupKind,
        enrichment: SweepReport,
        artwork: SweepReport,
        search: SweepReport,
        snapshots_removed: usize,
        orphans_removed: usize,
        corrupted_removed: usize,
    ) -> CleanupReport {
        let after = self
            .enrichment
            .validate()
            .await
            .combine(self.artwork.validate().await)
            .combine(self.search.validate().await);

        let finished_at = self.clock.now();
        self.record_cleanup(finished_at).await;

        let report = CleanupReport {
            kind,
            enrichment,
            artwork,
            search,
            snapshots_removed,
            orphans_removed,
            corrupted_removed,
            after,
            finished_at,
        };
        tracing::info!(
            target: "maintenance",
            "{} cleanup removed {} entries, {} snapshots, {} orphans; {} entries remain ({} corrupted)",
            kind,
            report.entries_removed(),
            snapshots_removed,
            orphans_removed,
            after.total(),
            after.corrupted
        );
        report
    }

    async fn record_cleanup(&self, at: DateTime<Utc>) {
        match encode_json(&at) {
            Ok(bytes) => {
                if let Err(e) = self.store.set(&last_cleanup_key(), &bytes).await {
                    tracing::warn!(target: "maintenance", "Failed to record cleanup time: {}", e);
                }
            }
            Err(e) => tracing::warn!(target: "maintenance", "Failed to encode cleanup time: {}", e),
        }
    }
}

fn last_cleanup_key() -> StoreKey {
    Namespace::Maintenance.key("last_cleanup")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLimits;
    use crate::clock::{Clock, ManualClock};
    use crate::history::HistoryLimits;
    use crate::model::{EnrichmentPayload, EntryId, LibraryEntry, SortConfiguration};
    use crate::store::MemoryStore;

    struct Fixture {
        coordinator: CacheCoordinator,
        enrichment: Arc<EnrichmentCache>,
        artwork: Arc<ArtworkCache>,
        history: Arc<RankHistoryTracker>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(config: MaintenanceConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limits = |days| CacheLimits {
            max_age: Duration::days(days),
            max_entries: 1_000,
            max_bytes: None,
        };
        let enrichment = Arc::new(EnrichmentCache::new(limits(90), store.clone(), clock.clone()));
        let artwork = Arc::new(ArtworkCache::new(
            CacheLimits {
                max_bytes: Some(1_000_000),
                ..limits(30)
            },
            Duration::days(7),
            store.clone(),
            clock.clone(),
        ));
        let search = Arc::new(SearchCache::new(limits(30), store.clone(), clock.clone()));
        let history = Arc::new(RankHistoryTracker::new(
            store.clone(),
            clock.clone(),
            HistoryLimits::default(),
        ));
        let coordinator = CacheCoordinator::new(
            enrichment.clone(),
            artwork.clone(),
            search,
            history.clone(),
            store.clone(),
            clock.clone(),
            config,
        );
        Fixture {
            coordinator,
            enrichment,
            artwork,
            history,
            store,
            clock,
        }
    }

    fn entry(id: &str) -> LibraryEntry {
        LibraryEntry::new(id, id, "artist", "album", 1)
    }

    fn payload() -> EnrichmentPayload {
        EnrichmentPayload {
            genre: Some("Rock".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cleanup_due_when_never_run() {
        let f = fixture(MaintenanceConfig::default());
        assert!(f.coordinator.should_run_cleanup().await);
        assert!(f.coordinator.run_cleanup_if_due().await.is_some());
        assert!(!f.coordinator.should_run_cleanup().await);
        assert!(f.coordinator.run_cleanup_if_due().await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_due_after_interval() {
        let f = fixture(MaintenanceConfig::default());
        f.coordinator.periodic_cleanup().await;
        f.clock.advance(Duration::hours(23));
        assert!(!f.coordinator.should_run_cleanup().await);
        f.clock.advance(Duration::hours(2));
        assert!(f.coordinator.should_run_cleanup().await);
    }

    #[tokio::test]
    async fn test_cleanup_due_on_corruption() {
        let f = fixture(MaintenanceConfig::default());
        for i in 0..5 {
            f.enrichment.put(&entry(&format!("e{}", i)), &payload()).await;
        }
        f.coordinator.periodic_cleanup().await;
        assert!(!f.coordinator.should_run_cleanup().await);

        f.store.insert_raw(&Namespace::Enrichment.key("e0"), b"garbage".to_vec());
        assert!(f.coordinator.should_run_cleanup().await);
    }

    #[tokio::test]
    async fn test_cleanup_clears_unread_corruption() {
        let f = fixture(MaintenanceConfig::default());
        for i in 0..5 {
            f.enrichment.put(&entry(&format!("e{}", i)), &payload()).await;
        }
        f.coordinator.periodic_cleanup().await;
        f.store.insert_raw(&Namespace::Enrichment.key("e0"), b"garbage".to_vec());

        let report = f.coordinator.run_cleanup_if_due().await.unwrap();
        assert_eq!(report.kind, CleanupKind::Periodic);
        assert_eq!(report.corrupted_removed, 1);
        assert_eq!(report.after.corrupted, 0);
        assert_eq!(report.after.valid, 4);
        assert!(!f.store.contains(&Namespace::Enrichment.key("e0")));
        assert!(!f.coordinator.should_run_cleanup().await);
        assert!(f.coordinator.run_cleanup_if_due().await.is_none());
    }

    #[tokio::test]
    async fn test_emergency_cleanup_purges_corruption() {
        let f = fixture(MaintenanceConfig::default());
        f.enrichment.put(&entry("a"), &payload()).await;
        f.enrichment.put(&entry("b"), &payload()).await;
        f.store.insert_raw(&Namespace::Enrichment.key("a"), b"garbage".to_vec());

        let report = f.coordinator.emergency_cleanup().await;
        assert_eq!(report.corrupted_removed, 1);
        assert_eq!(report.entries_removed(), 1);
        assert_eq!(report.after.corrupted, 0);
    }

    #[tokio::test]
    async fn test_cleanup_due_over_hard_ceiling_runs_emergency() {
        let f = fixture(MaintenanceConfig {
            key_soft_threshold: 2,
            key_hard_ceiling: 4,
            ..Default::default()
        });
        f.coordinator.periodic_cleanup().await;
        for i in 0..5 {
            f.enrichment.put(&entry(&format!("e{}", i)), &payload()).await;
        }
        assert!(f.coordinator.should_run_cleanup().await);
        let report = f.coordinator.run_cleanup_if_due().await.unwrap();
        assert_eq!(report.kind, CleanupKind::Emergency);
    }

    #[tokio::test]
    async fn test_periodic_cleanup_sweeps_and_records() {
        let f = fixture(MaintenanceConfig::default());
        f.enrichment.put(&entry("old"), &payload()).await;
        f.history
            .save_snapshot(&[entry("old")], SortConfiguration::default())
            .await;
        f.clock.advance(Duration::days(91));
        f.enrichment.put(&entry("new"), &payload()).await;

        let report = f.coordinator.periodic_cleanup().await;

        assert_eq!(report.kind, CleanupKind::Periodic);
        assert_eq!(report.enrichment.expired, 1);
        assert_eq!(report.snapshots_removed, 1);
        assert_eq!(report.after.valid, 1);
        assert_eq!(f.coordinator.last_cleanup().await, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_emergency_cleanup_uses_tight_ages_and_removes_orphans() {
        let f = fixture(MaintenanceConfig::default());
        f.enrichment.put(&entry("a"), &payload()).await;
        f.artwork.put(&EntryId::new("a"), vec![1; 32]).await;
        f.store.insert_raw(&Namespace::Artwork.key("orphan"), vec![1]);

        // Within normal limits, past the emergency ones
        f.clock.advance(Duration::days(8));
        let periodic = f.coordinator.periodic_cleanup().await;
        assert_eq!(periodic.entries_removed(), 0);

        let report = f.coordinator.emergency_cleanup().await;
        assert_eq!(report.kind, CleanupKind::Emergency);
        assert_eq!(report.artwork.expired, 1);
        assert_eq!(report.enrichment.expired, 0);
        assert_eq!(report.orphans_removed, 1);
        assert!(!f.store.contains(&Namespace::Artwork.key("orphan")));
    }

    #[tokio::test]
    async fn test_health_report() {
        let f = fixture(MaintenanceConfig::default());
        let report = f.coordinator.health_report().await;
        assert!((report.score - 0.8).abs() < 1e-9);
        assert!(report.issues.contains(HealthIssues::NEVER_CLEANED));
        assert!(!report.recommendations.is_empty());

        f.coordinator.periodic_cleanup().await;
        let report = f.coordinator.health_report().await;
        assert_eq!(report.score, 1.0);
        assert!(report.recommendations.is_empty());
        assert_eq!(f.coordinator.health_score().await, 1.0);
    }

    #[tokio::test]
    async fn test_corrupted_timestamp_counts_as_never() {
        let f = fixture(MaintenanceConfig::default());
        f.store.insert_raw(&last_cleanup_key(), b"yesterday".to_vec());
        assert_eq!(f.coordinator.last_cleanup().await, None);
        assert!(f.coordinator.should_run_cleanup().await);
    }
}

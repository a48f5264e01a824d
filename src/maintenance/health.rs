//! Cache health scoring.
//!
//! # Health Score
//!
//! Starts at 1.0 and is reduced by independently capped penalties:
//! - key count over the soft threshold: up to 0.3
//! - corrupted entry ratio: up to 0.3
//! - stale entry ratio: up to 0.2
//! - time since the last cleanup: 0.1 after a day, 0.2 after a week or
//!   when no cleanup ever ran
//!
//! The score never goes below 0.0.

use bitflags::bitflags;
use chrono::{DateTime, Duration, Utc};

use crate::cache::ValidationReport;
use crate::history::HistoryStats;

bitflags! {
    /// Problems found while scoring. Empty means healthy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HealthIssues: u32 {
        /// More keys than the soft threshold
        const KEY_COUNT_HIGH = 1 << 0;
        /// More keys than the hard ceiling
        const KEY_COUNT_CRITICAL = 1 << 1;
        /// Corrupted entries present
        const CORRUPTION = 1 << 2;
        /// Corruption ratio above the cleanup trigger
        const CORRUPTION_HIGH = 1 << 3;
        /// Stale entries awaiting a sweep
        const STALE_ENTRIES = 1 << 4;
        /// Last cleanup older than the periodic interval
        const CLEANUP_OVERDUE = 1 << 5;
        /// No cleanup has ever run
        const NEVER_CLEANED = 1 << 6;
        /// A rank history list failed to decode
        const HISTORY_CORRUPTED = 1 << 7;

        /// Any of these makes the next cleanup an emergency one
        const NEEDS_EMERGENCY = Self::KEY_COUNT_CRITICAL.bits();
        /// Any of these makes a cleanup due
        const NEEDS_CLEANUP = Self::KEY_COUNT_CRITICAL.bits()
            | Self::CORRUPTION_HIGH.bits()
            | Self::CLEANUP_OVERDUE.bits()
            | Self::NEVER_CLEANED.bits();
    }
}

impl HealthIssues {
    /// One recommendation per issue, most severe first.
    pub fn recommendations(&self) -> Vec<&'static str> {
        let mut recs = Vec::new();
        if self.contains(Self::KEY_COUNT_CRITICAL) {
            recs.push("Key count is over the hard ceiling: run an emergency cleanup");
        } else if self.contains(Self::KEY_COUNT_HIGH) {
            recs.push("Key count is over the soft threshold: run a cleanup soon");
        }
        if self.contains(Self::CORRUPTION_HIGH) {
            recs.push("Many cache entries are corrupted: run a cleanup");
        } else if self.contains(Self::CORRUPTION) {
            recs.push("Some cache entries are corrupted; the next read or cleanup drops them");
        }
        if self.contains(Self::STALE_ENTRIES) {
            recs.push("Stale cache entries are waiting for a sweep");
        }
        if self.contains(Self::NEVER_CLEANED) {
            recs.push("No cleanup has ever run");
        } else if self.contains(Self::CLEANUP_OVERDUE) {
            recs.push("Periodic cleanup is overdue");
        }
        if self.contains(Self::HISTORY_CORRUPTED) {
            recs.push("Rank history is unreadable for some sort orders; clear it");
        }
        recs
    }
}

/// Thresholds the score is computed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub key_soft_threshold: usize,
    pub key_hard_ceiling: usize,
    pub corruption_threshold: f64,
    pub cleanup_interval: Duration,
}

/// Everything the coordinator measured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub enrichment: ValidationReport,
    pub artwork: ValidationReport,
    pub search: ValidationReport,
    pub history: HistoryStats,
    pub key_count: usize,
    pub last_cleanup: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// The three caches combined.
    pub fn aggregate(&self) -> ValidationReport {
        self.enrichment.combine(self.artwork).combine(self.search)
    }
}

/// Score plus what to do about it.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub score: f64,
    pub issues: HealthIssues,
    pub recommendations: Vec<String>,
    pub stats: CacheStats,
}

const KEY_PENALTY_MAX: f64 = 0.3;
const CORRUPTION_PENALTY_MAX: f64 = 0.3;
const STALENESS_PENALTY_MAX: f64 = 0.2;

pub(crate) fn key_penalty(key_count: usize, t: &HealthThresholds) -> f64 {
    if key_count <= t.key_soft_threshold {
        return 0.0;
    }
    let span = t.key_hard_ceiling.saturating_sub(t.key_soft_threshold).max(1) as f64;
    let over = (key_count - t.key_soft_threshold) as f64;
    (KEY_PENALTY_MAX * over / span).min(KEY_PENALTY_MAX)
}

pub(crate) fn corruption_penalty(ratio: f64) -> f64 {
    (ratio * 3.0).clamp(0.0, CORRUPTION_PENALTY_MAX)
}

pub(crate) fn staleness_penalty(ratio: f64) -> f64 {
    (ratio * 0.5).clamp(0.0, STALENESS_PENALTY_MAX)
}

pub(crate) fn cleanup_age_penalty(last_cleanup: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_cleanup {
        None => 0.2,
        Some(last) if now - last > Duration::days(7) => 0.2,
        Some(last) if now - last > Duration::hours(24) => 0.1,
        Some(_) => 0.0,
    }
}

/// Health score for `stats` at `now`, in `[0.0, 1.0]`.
pub fn health_score(stats: &CacheStats, now: DateTime<Utc>, t: &HealthThresholds) -> f64 {
    let aggregate = stats.aggregate();
    let penalty = key_penalty(stats.key_count, t)
        + corruption_penalty(aggregate.corruption_ratio())
        + staleness_penalty(aggregate.staleness_ratio())
        + cleanup_age_penalty(stats.last_cleanup, now);
    (1.0 - penalty).clamp(0.0, 1.0)
}

/// Flag every issue present in `stats`.
pub fn detect_issues(stats: &CacheStats, now: DateTime<Utc>, t: &HealthThresholds) -> HealthIssues {
    let aggregate = stats.aggregate();
    let mut issues = HealthIssues::empty();

    if stats.key_count > t.key_hard_ceiling {
        issues |= HealthIssues::KEY_COUNT_CRITICAL;
    }
    if stats.key_count > t.key_soft_threshold {
        issues |= HealthIssues::KEY_COUNT_HIGH;
    }
    if aggregate.corrupted > 0 {
        issues |= HealthIssues::CORRUPTION;
    }
    if aggregate.corruption_ratio() > t.corruption_threshold {
        issues |= HealthIssues::CORRUPTION_HIGH;
    }
    if aggregate.stale > 0 {
        issues |= HealthIssues::STALE_ENTRIES;
    }
    match stats.last_cleanup {
        None => issues |= HealthIssues::NEVER_CLEANED,
        Some(last) if now - last > t.cleanup_interval => issues |= HealthIssues::CLEANUP_OVERDUE,
        Some(_) => {}
    }
    if stats.history.undecodable > 0 {
        issues |= HealthIssues::HISTORY_CORRUPTED;
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn thresholds() -> HealthThresholds {
        HealthThresholds {
            key_soft_threshold: 5_000,
            key_hard_ceiling: 10_000,
            corruption_threshold: 0.1,
            cleanup_interval: Duration::hours(24),
        }
    }

    fn report(valid: usize, stale: usize, corrupted: usize) -> ValidationReport {
        ValidationReport {
            valid,
            stale,
            corrupted,
            total_bytes: 0,
        }
    }

    #[test]
    fn test_perfect_health() {
        let now = Utc::now();
        let stats = CacheStats {
            enrichment: report(10, 0, 0),
            key_count: 20,
            last_cleanup: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(health_score(&stats, now, &thresholds()), 1.0);
        assert!(detect_issues(&stats, now, &thresholds()).is_empty());
    }

    #[test]
    fn test_never_cleaned_costs_point_two() {
        let now = Utc::now();
        let stats = CacheStats::default();
        let score = health_score(&stats, now, &thresholds());
        assert!((score - 0.8).abs() < 1e-9);
        assert!(detect_issues(&stats, now, &thresholds()).contains(HealthIssues::NEVER_CLEANED));
    }

    #[test]
    fn test_cleanup_age_steps() {
        let now = Utc::now();
        assert_eq!(cleanup_age_penalty(Some(now - Duration::hours(2)), now), 0.0);
        assert_eq!(cleanup_age_penalty(Some(now - Duration::hours(30)), now), 0.1);
        assert_eq!(cleanup_age_penalty(Some(now - Duration::days(8)), now), 0.2);
    }

    #[test]
    fn test_key_penalty_scales_to_cap() {
        let t = thresholds();
        assert_eq!(key_penalty(5_000, &t), 0.0);
        assert!((key_penalty(7_500, &t) - 0.15).abs() < 1e-9);
        assert_eq!(key_penalty(50_000, &t), 0.3);
    }

    #[test]
    fn test_worst_case_floors_at_zero() {
        let now = Utc::now();
        let stats = CacheStats {
            enrichment: report(0, 5, 5),
            key_count: 1_000_000,
            last_cleanup: None,
            ..Default::default()
        };
        let score = health_score(&stats, now, &thresholds());
        assert!(score >= 0.0);
        assert!(score < 0.1);

        let issues = detect_issues(&stats, now, &thresholds());
        assert!(issues.intersects(HealthIssues::NEEDS_EMERGENCY));
        assert!(issues.contains(HealthIssues::CORRUPTION_HIGH));
    }

    #[test]
    fn test_soft_threshold_and_staleness_do_not_force_cleanup() {
        let now = Utc::now();
        let stats = CacheStats {
            enrichment: report(10, 5, 0),
            key_count: 7_000,
            last_cleanup: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        let issues = detect_issues(&stats, now, &thresholds());
        assert!(issues.contains(HealthIssues::KEY_COUNT_HIGH | HealthIssues::STALE_ENTRIES));
        assert!(!issues.intersects(HealthIssues::NEEDS_CLEANUP));
    }

    #[test]
    fn test_recommendations_follow_issues() {
        let issues = HealthIssues::KEY_COUNT_HIGH | HealthIssues::KEY_COUNT_CRITICAL;
        let recs = issues.recommendations();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("emergency"));
        assert!(HealthIssues::empty().recommendations().is_empty());
    }

    proptest! {
        #[test]
        fn score_is_bounded(
            valid in 0usize..1000,
            stale in 0usize..1000,
            corrupted in 0usize..1000,
            keys in 0usize..100_000,
            hours in prop::option::of(0i64..10_000),
        ) {
            let now = Utc::now();
            let stats = CacheStats {
                search: report(valid, stale, corrupted),
                key_count: keys,
                last_cleanup: hours.map(|h| now - Duration::hours(h)),
                ..Default::default()
            };
            let score = health_score(&stats, now, &thresholds());
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}

//! Queue items and tiers.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::model::{LibraryEntry, SortConfiguration};

/// Urgency levels, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Urgent,
    High,
    Medium,
    Low,
    Background,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::Urgent, Tier::High, Tier::Medium, Tier::Low, Tier::Background];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Urgent => "urgent",
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
            Tier::Background => "background",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an entry was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
    NowPlaying,
    /// Playing, but not part of the library snapshot
    NowPlayingOutsideLibrary,
    TopOfActiveSort,
    TopOfSort(SortConfiguration),
    BottomOfSort(SortConfiguration),
    Played,
    Idle,
}

impl fmt::Display for QueueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueReason::NowPlaying => f.write_str("currently playing"),
            QueueReason::NowPlayingOutsideLibrary => {
                f.write_str("currently playing, not in library")
            }
            QueueReason::TopOfActiveSort => f.write_str("visible in active sort"),
            QueueReason::TopOfSort(sort) => write!(f, "top of {}", sort),
            QueueReason::BottomOfSort(sort) => write!(f, "bottom of {}", sort),
            QueueReason::Played => f.write_str("has plays"),
            QueueReason::Idle => f.write_str("idle backfill"),
        }
    }
}

/// One queued entry.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub entry: LibraryEntry,
    pub tier: Tier,
    pub reason: QueueReason,
    pub enqueued_at: DateTime<Utc>,
    /// Insertion order, breaks remaining ties
    pub(crate) seq: u64,
}

impl QueueItem {
    /// Ordering: tier, then newest first, then insertion order.
    pub(crate) fn order_key(&self) -> (Tier, std::cmp::Reverse<DateTime<Utc>>, u64) {
        (self.tier, std::cmp::Reverse(self.enqueued_at), self.seq)
    }
}

/// Items per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub urgent: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub background: usize,
}

impl TierCounts {
    pub fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::Urgent => self.urgent,
            Tier::High => self.high,
            Tier::Medium => self.medium,
            Tier::Low => self.low,
            Tier::Background => self.background,
        }
    }

    pub(crate) fn add(&mut self, tier: Tier) {
        match tier {
            Tier::Urgent => self.urgent += 1,
            Tier::High => self.high += 1,
            Tier::Medium => self.medium += 1,
            Tier::Low => self.low += 1,
            Tier::Background => self.background += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.urgent + self.high + self.medium + self.low + self.background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        let mut tiers = Tier::ALL.to_vec();
        tiers.reverse();
        tiers.sort();
        assert_eq!(tiers, Tier::ALL.to_vec());
    }

    #[test]
    fn test_reason_display() {
        let sort = SortConfiguration::default();
        assert_eq!(QueueReason::TopOfSort(sort).to_string(), "top of play_count_desc");
    }
}

//! Test utilities and fixtures for playrank tests.
//!
//! This module provides common test helpers, mock factories, and
//! store utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{memory_store, manual_clock, mock_library};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let store = memory_store();
//!     let clock = manual_clock();
//!     let library = mock_library(100);
//!     // ... test logic
//! }
//! ```

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::clock::ManualClock;
use crate::model::LibraryEntry;
use crate::store::{MemoryStore, SqliteStore, db_url};

/// Creates a temporary SQLite store for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// # Returns
///
/// A tuple of (store, temp directory handle).
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_sqlite_store() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let url = db_url(Some(&dir.path().join("test.db")));

    let store = SqliteStore::open(&url)
        .await
        .expect("Failed to initialize test store");

    (store, dir)
}

/// Shared in-memory store.
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Manual clock starting at a fixed instant, so failures reproduce.
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid fixed timestamp"),
    ))
}

/// Creates a library entry with sensible defaults.
pub fn mock_entry(id: &str, play_count: u32) -> LibraryEntry {
    LibraryEntry::new(
        id,
        format!("Title {id}"),
        "Test Artist",
        "Test Album",
        play_count,
    )
}

/// Creates `n` entries with distinct, non-zero play counts.
///
/// Play counts are a permutation of `1..=n` that does not follow title
/// order, so play-count and text sorts pick different windows. `n` must
/// not be a multiple of 37.
pub fn mock_library(n: usize) -> Vec<LibraryEntry> {
    assert!(n % 37 != 0, "mock_library needs n coprime with 37");
    (0..n)
        .map(|i| {
            LibraryEntry::new(
                format!("track-{i:04}"),
                format!("Track {i:04}"),
                format!("Artist {}", i % 13),
                format!("Album {}", i % 29),
                ((i * 37) % n) as u32 + 1,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, Namespace};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_temp_sqlite_store_is_usable() {
        let (store, _dir) = temp_sqlite_store().await;
        let key = Namespace::Enrichment.key("smoke");
        store.set(&key, b"x").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_mock_library_play_counts_are_a_permutation() {
        let library = mock_library(100);
        let counts: HashSet<u32> = library.iter().map(|e| e.play_count).collect();
        assert_eq!(counts.len(), 100);
        assert!(counts.iter().all(|c| (1..=100).contains(c)));
        assert_eq!(library[1].play_count, 38);
    }

    #[test]
    fn test_mock_entry_defaults() {
        let entry = mock_entry("a", 3);
        assert_eq!(entry.id.as_str(), "a");
        assert_eq!(entry.title, "Title a");
        assert_eq!(entry.play_count, 3);
    }
}

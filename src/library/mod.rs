//! Library access.
//!
//! The platform media index is reached through [`LibrarySource`].
//! [`LibraryAccessor`] serializes access to it: at most one fetch is in
//! flight, results are cached until [`LibraryAccessor::invalidate`], and
//! every successful fetch is announced on the event channel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::events::{EventChannel, LibraryEvent};
use crate::model::LibraryEntry;

/// Library access failures. These are the only failures surfaced to the
/// user.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("No library entries (the library is empty or access was not granted)")]
    NoEntries,

    #[error("Library unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read library export {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid library export: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of raw library entries.
#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Every entry in the library. Fails with [`LibraryError::NoEntries`]
    /// when there is nothing to return.
    async fn fetch_all_entries(&self) -> Result<Vec<LibraryEntry>, LibraryError>;
}

/// Reads a JSON library export: either an array of entries or an object
/// with an `entries` array.
pub struct JsonLibrarySource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Export {
    Bare(Vec<LibraryEntry>),
    Wrapped { entries: Vec<LibraryEntry> },
}

impl JsonLibrarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse an export, dropping duplicate ids (first wins).
    pub fn parse(bytes: &[u8]) -> Result<Vec<LibraryEntry>, LibraryError> {
        let entries = match serde_json::from_slice::<Export>(bytes)? {
            Export::Bare(entries) => entries,
            Export::Wrapped { entries } => entries,
        };

        let mut seen = HashSet::new();
        let before = entries.len();
        let entries: Vec<LibraryEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect();
        if entries.len() < before {
            tracing::warn!(target: "library", "Dropped {} duplicate entries", before - entries.len());
        }

        if entries.is_empty() {
            return Err(LibraryError::NoEntries);
        }
        Ok(entries)
    }
}

#[async_trait]
impl LibrarySource for JsonLibrarySource {
    async fn fetch_all_entries(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
        let path = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            std::fs::read(&path).map_err(|source| LibraryError::Io { path, source })
        })
        .await
        .map_err(|e| LibraryError::Unavailable(e.to_string()))??;

        Self::parse(&bytes)
    }
}

/// Serialized, cached access to a [`LibrarySource`].
pub struct LibraryAccessor {
    source: Arc<dyn LibrarySource>,
    events: EventChannel,
    cached: Mutex<Option<Arc<Vec<LibraryEntry>>>>,
    fetches: AtomicUsize,
}

impl LibraryAccessor {
    pub fn new(source: Arc<dyn LibrarySource>, events: EventChannel) -> Self {
        Self {
            source,
            events,
            cached: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Current entries, fetching if nothing is cached.
    pub async fn entries(&self) -> Result<Arc<Vec<LibraryEntry>>, LibraryError> {
        let mut cached = self.cached.lock().await;
        if let Some(entries) = cached.as_ref() {
            return Ok(entries.clone());
        }
        self.fetch_into(&mut cached).await
    }

    /// Drop the cached entries; the next call refetches.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
        tracing::debug!(target: "library", "Library cache invalidated");
    }

    /// Invalidate and fetch again as one step.
    pub async fn refresh(&self) -> Result<Arc<Vec<LibraryEntry>>, LibraryError> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        self.fetch_into(&mut cached).await
    }

    /// Number of fetches performed.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn fetch_into(
        &self,
        slot: &mut Option<Arc<Vec<LibraryEntry>>>,
    ) -> Result<Arc<Vec<LibraryEntry>>, LibraryError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        match self.source.fetch_all_entries().await {
            Ok(entries) if entries.is_empty() => Err(self.fail(LibraryError::NoEntries)),
            Ok(entries) => {
                let entries = Arc::new(entries);
                *slot = Some(entries.clone());
                tracing::info!(target: "library", "Loaded {} library entries", entries.len());
                self.events.publish(LibraryEvent::LibraryChanged {
                    entry_count: entries.len(),
                });
                Ok(entries)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&self, error: LibraryError) -> LibraryError {
        tracing::error!(target: "library", "Library fetch failed: {}", error);
        self.events.publish(LibraryEvent::Error(error.to_string()));
        error
    }
}

#[cfg(test)]
pub mod mocks {
    //! Mock library source for testing.

    use super::*;
    use std::time::Duration;

    /// Returns fixed entries, optionally after a delay.
    pub struct MockLibrarySource {
        pub entries: Vec<LibraryEntry>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl MockLibrarySource {
        pub fn new(entries: Vec<LibraryEntry>) -> Self {
            Self {
                entries,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn slow(entries: Vec<LibraryEntry>, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(entries)
            }
        }
    }

    #[async_trait]
    impl LibrarySource for MockLibrarySource {
        async fn fetch_all_entries(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.entries.is_empty() {
                return Err(LibraryError::NoEntries);
            }
            Ok(self.entries.clone())
        }
    }
}

//! Now-playing state.
//!
//! The scheduler and the reconciler both need to know what is currently
//! playing. Instead of a process-wide shared object, the state is owned by a
//! [`PlaybackState`] and handed to consumers as an
//! `Arc<dyn CurrentPlaybackObserver>`. The single writer is whoever owns the
//! `PlaybackState` (the service facade); readers can also watch for changes.

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::LibraryEntry;

/// What is playing right now.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub entry: LibraryEntry,
    /// False for tracks streamed from outside the local library.
    pub is_from_library_source: bool,
}

/// Read side of the now-playing state.
pub trait CurrentPlaybackObserver: Send + Sync {
    fn now_playing(&self) -> Option<NowPlaying>;
}

/// Writable now-playing state backed by a `watch` channel.
#[derive(Debug)]
pub struct PlaybackState {
    tx: watch::Sender<Option<NowPlaying>>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Replace the now-playing entry. Returns true if it changed identity
    /// or library-source flag.
    pub fn set(&self, now_playing: Option<NowPlaying>) -> bool {
        self.tx.send_if_modified(|current| {
            let changed = match (current.as_ref(), now_playing.as_ref()) {
                (None, None) => false,
                (Some(a), Some(b)) => {
                    a.entry.id != b.entry.id || a.is_from_library_source != b.is_from_library_source
                }
                _ => true,
            };
            *current = now_playing;
            changed
        })
    }

    /// Receiver that wakes on every identity change.
    pub fn watch(&self) -> watch::Receiver<Option<NowPlaying>> {
        self.tx.subscribe()
    }
}

impl CurrentPlaybackObserver for PlaybackState {
    fn now_playing(&self) -> Option<NowPlaying> {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(id: &str) -> Option<NowPlaying> {
        Some(NowPlaying {
            entry: LibraryEntry::new(id, "Song", "Artist", "Album", 1),
            is_from_library_source: true,
        })
    }

    #[test]
    fn test_set_reports_changes() {
        let state = PlaybackState::new();
        assert!(state.now_playing().is_none());
        assert!(state.set(playing("a")));
        assert!(!state.set(playing("a")));
        assert!(state.set(playing("b")));
        assert!(state.set(None));
        assert!(!state.set(None));
    }

    #[tokio::test]
    async fn test_watchers_see_changes() {
        let state = PlaybackState::new();
        let mut rx = state.watch();
        state.set(playing("a"));
        rx.changed().await.unwrap();
        let current = rx.borrow().clone();
        assert_eq!(current.map(|n| n.entry.id.to_string()), Some("a".to_string()));
    }
}

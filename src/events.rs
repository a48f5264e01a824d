//! Typed event channels between components.
//!
//! Producers (the reconciler, the library accessor, the executor) hold an
//! [`EventChannel`] handed to them at construction; any number of consumers
//! call [`EventChannel::subscribe`]. Events are fire-and-forget: a send with
//! no subscribers is silently dropped.

use tokio::sync::broadcast;

use crate::model::EntryId;

/// Default channel capacity. Slow subscribers see `Lagged` once this many
/// events queue up.
const DEFAULT_CAPACITY: usize = 256;

/// Cross-component notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    /// Library contents were (re)fetched.
    LibraryChanged { entry_count: usize },
    /// A full natural play of an entry completed.
    PlayCompleted { id: EntryId, displayed_play_count: u32 },
    /// The system play count went backwards during reconciliation.
    ReconciliationAnomaly {
        id: EntryId,
        previous_baseline: u32,
        system: u32,
    },
    /// An entry was enriched and its cache entry written.
    EntryEnriched { id: EntryId },
    /// A user-visible failure (library unavailable).
    Error(String),
}

/// Broadcast channel carrying [`LibraryEvent`]s.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<LibraryEvent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: LibraryEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(target: "events", "Event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let channel = EventChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        channel.publish(LibraryEvent::LibraryChanged { entry_count: 3 });

        assert_eq!(
            a.recv().await.unwrap(),
            LibraryEvent::LibraryChanged { entry_count: 3 }
        );
        assert_eq!(
            b.recv().await.unwrap(),
            LibraryEvent::LibraryChanged { entry_count: 3 }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let channel = EventChannel::new();
        channel.publish(LibraryEvent::Error("nobody listening".to_string()));
    }
}

//! Durable key-value storage.
//!
//! The core persists everything through the [`KeyValueStore`] trait: a plain
//! string-keyed byte store with no transactions. Two implementations ship
//! with the crate:
//!
//! - [`MemoryStore`] - process-local, used by tests and dry runs
//! - [`SqliteStore`] - a single `kv` table in SQLite via SQLx
//!
//! Keys are never built by string concatenation at call sites. Each
//! [`Namespace`] hands out opaque [`StoreKey`]s, so two namespaces cannot
//! collide by construction.

mod memory;
mod sqlite;

use std::fmt;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::{DEFAULT_DB_NAME, SqliteStore, db_url};

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable string-keyed byte storage.
///
/// Every multi-key operation built on top of this trait must tolerate
/// partial application; there are no transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write (insert or replace) the value under `key`.
    async fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError>;

    /// Every key starting with `prefix`, in ascending order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<StoreKey>, StoreError>;

    /// Byte size of the value under `key`, if present.
    async fn value_size(&self, key: &StoreKey) -> Result<Option<u64>, StoreError>;

    /// Total number of keys in the store.
    async fn key_count(&self) -> Result<usize, StoreError> {
        Ok(self.keys_with_prefix("").await?.len())
    }
}

/// Key ranges owned by the individual components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Enrichment cache values
    Enrichment,
    /// Artwork cache values
    Artwork,
    /// Catalog-search cache values
    Search,
    /// The single "currently displayed" artwork slot
    CurrentArtwork,
    /// Rank snapshot lists, one key per sort configuration
    RankHistory,
    /// Local play-count state, one key per entry
    PlayCount,
    /// Coordinator bookkeeping
    Maintenance,
}

impl Namespace {
    /// Namespaces whose values are tracked by a metadata index.
    pub const INDEXED: [Namespace; 3] = [Namespace::Enrichment, Namespace::Artwork, Namespace::Search];

    pub const ALL: [Namespace; 7] = [
        Namespace::Enrichment,
        Namespace::Artwork,
        Namespace::Search,
        Namespace::CurrentArtwork,
        Namespace::RankHistory,
        Namespace::PlayCount,
        Namespace::Maintenance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Enrichment => "enrichment",
            Namespace::Artwork => "artwork",
            Namespace::Search => "search",
            Namespace::CurrentArtwork => "current_artwork",
            Namespace::RankHistory => "rank_history",
            Namespace::PlayCount => "playcount",
            Namespace::Maintenance => "maintenance",
        }
    }

    /// Prefix shared by every value key in this namespace.
    pub fn prefix(&self) -> String {
        format!("{}:", self.name())
    }

    /// Key for item `id` in this namespace.
    pub fn key(&self, id: &str) -> StoreKey {
        StoreKey(format!("{}:{}", self.name(), id))
    }

    /// Key of this namespace's metadata index. Deliberately outside
    /// [`Namespace::prefix`] so index keys never show up as values.
    pub fn index_key(&self) -> StoreKey {
        StoreKey(format!("index/{}", self.name()))
    }

    /// Item id of `key` if it belongs to this namespace.
    pub fn id_of<'a>(&self, key: &'a StoreKey) -> Option<&'a str> {
        key.0
            .strip_prefix(self.name())
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque store key produced by a [`Namespace`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(String);

impl StoreKey {
    /// Wrap a key enumerated from the backing medium.
    ///
    /// Only store implementations should need this; everything else gets
    /// keys from [`Namespace::key`].
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_do_not_collide() {
        let a = Namespace::Artwork.key("x");
        let b = Namespace::CurrentArtwork.key("x");
        assert_ne!(a, b);
        assert_eq!(Namespace::Artwork.id_of(&a), Some("x"));
        assert_eq!(Namespace::Artwork.id_of(&b), None);
    }

    #[test]
    fn test_index_key_outside_prefix() {
        for ns in Namespace::ALL {
            assert!(!ns.index_key().as_str().starts_with(&ns.prefix()));
        }
    }

    #[test]
    fn test_id_with_colon() {
        let key = Namespace::Search.key("a:b");
        assert_eq!(Namespace::Search.id_of(&key), Some("a:b"));
    }
}

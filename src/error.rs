//! Application-wide error types.
//!
//! Each subsystem has its own `thiserror` enum; [`Error`] aggregates them
//! for callers that drive several subsystems at once (the service facade).
//! The CLI and `main` use `anyhow`.
//!
//! Most cache-side failures never reach this type: corruption, ceiling
//! rejections and store hiccups degrade to misses inside the caches.
//!
//! # Example
//!
//! ```ignore
//! use playrank::error::{Result, ResultExt};
//!
//! async fn open(url: &str) -> Result<SqliteStore> {
//!     SqliteStore::open(url).await.with_context("opening cache store")
//! }
//! ```

use crate::cache::CodecError;
use crate::config::ConfigError;
use crate::enrichment::EnrichmentError;
use crate::library::LibraryError;
use crate::store::StoreError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key-value store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Library unavailable or empty
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// Catalog lookup error
    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    /// Record encoding error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown entry id
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::EntryNotFound(id.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, StoreError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Store(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, LibraryError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Library(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::entry_not_found("track-42");
        assert!(err.to_string().contains("track-42"));
    }

    #[test]
    fn test_library_error_is_transparent() {
        let err: Error = LibraryError::NoEntries.into();
        assert_eq!(err.to_string(), LibraryError::NoEntries.to_string());
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::from(EnrichmentError::Timeout).context("while enriching");
        let msg = err.to_string();
        assert!(msg.contains("while enriching"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), LibraryError> =
            Err(LibraryError::Unavailable("denied".to_string()));
        let with_ctx = result.with_context("loading library");
        let msg = with_ctx.unwrap_err().to_string();
        assert!(msg.contains("loading library"));
        assert!(msg.contains("denied"));
    }
}

//! Trait definitions for external catalog clients.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the real client implementations, while tests
//! can substitute mock implementations.
//!
//! # Example
//!
//! ```ignore
//! use playrank::enrichment::traits::CatalogSearch;
//!
//! async fn lookup<T: CatalogSearch>(client: &T) {
//!     let candidates = client.search("bohemian rhapsody queen", 5).await?;
//! }
//! ```

use async_trait::async_trait;

use super::coverart::{CoverArtClient, CoverSize};
use super::domain::{CandidateMatch, EnrichmentError};
use super::musicbrainz::MusicBrainzClient;

/// Remote catalog search.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Search the catalog for `query`, returning at most `result_limit`
    /// candidates in the catalog's relevance order.
    async fn search(
        &self,
        query: &str,
        result_limit: usize,
    ) -> Result<Vec<CandidateMatch>, EnrichmentError>;
}

/// Downloads artwork bytes for a matched candidate.
#[async_trait]
pub trait ArtworkFetcher: Send + Sync {
    async fn fetch_artwork(&self, candidate: &CandidateMatch) -> Result<Vec<u8>, EnrichmentError>;
}

// Implement traits for real clients

#[async_trait]
impl CatalogSearch for MusicBrainzClient {
    async fn search(
        &self,
        query: &str,
        result_limit: usize,
    ) -> Result<Vec<CandidateMatch>, EnrichmentError> {
        self.search_recordings(query, result_limit).await
    }
}

#[async_trait]
impl ArtworkFetcher for CoverArtClient {
    async fn fetch_artwork(&self, candidate: &CandidateMatch) -> Result<Vec<u8>, EnrichmentError> {
        if let Some(url) = candidate.artwork_url.as_deref() {
            return self.download(url).await.map(|art| art.data);
        }
        let release_id = candidate
            .payload
            .release_id
            .as_deref()
            .ok_or(EnrichmentError::NoMatches)?;
        self.get_front_cover(release_id, CoverSize::Medium)
            .await
            .map(|art| art.data)
    }
}

/// Mock catalog clients for testing.
///
/// Return configurable responses for testing different scenarios.
#[cfg(test)]
pub mod mocks {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// Mock catalog that answers from a query -> candidates table.
    #[derive(Default)]
    pub struct MockCatalog {
        /// Candidates keyed by the exact query string
        pub responses: HashMap<String, Vec<CandidateMatch>>,
        /// Returned for queries not in `responses`
        pub fallback: Vec<CandidateMatch>,
        /// Error to return (takes precedence over results)
        pub error: Option<EnrichmentError>,
        /// Number of searches performed
        pub calls: AtomicUsize,
        /// Queries seen, in call order
        pub queries: Mutex<Vec<String>>,
    }

    impl MockCatalog {
        /// Create a mock that never finds anything.
        pub fn empty() -> Self {
            Self::default()
        }

        /// Create a mock that returns one candidate for every query.
        pub fn always(title: &str, artist: &str) -> Self {
            Self {
                fallback: vec![candidate(title, artist)],
                ..Default::default()
            }
        }

        /// Create a mock with canned responses per query.
        pub fn with_responses(responses: HashMap<String, Vec<CandidateMatch>>) -> Self {
            Self {
                responses,
                ..Default::default()
            }
        }

        /// Create a mock that returns an error.
        pub fn with_error(error: EnrichmentError) -> Self {
            Self {
                error: Some(error),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSearch for MockCatalog {
        async fn search(
            &self,
            query: &str,
            result_limit: usize,
        ) -> Result<Vec<CandidateMatch>, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().push(query.to_string());
            if let Some(ref err) = self.error {
                return Err(err.clone());
            }
            let mut results = self
                .responses
                .get(query)
                .cloned()
                .unwrap_or_else(|| self.fallback.clone());
            results.truncate(result_limit);
            Ok(results)
        }
    }

    /// Build a candidate with a release id so artwork can be fetched.
    pub fn candidate(title: &str, artist: &str) -> CandidateMatch {
        CandidateMatch {
            title: title.to_string(),
            artist: artist.to_string(),
            album: Some("Mock Album".to_string()),
            payload: crate::model::EnrichmentPayload {
                genre: Some("Rock".to_string()),
                release_id: Some("mock-release-id".to_string()),
                ..Default::default()
            },
            artwork_url: None,
        }
    }

    /// Mock artwork fetcher.
    pub struct MockArtwork {
        /// Size of the placeholder image
        pub size: usize,
        /// Error to return
        pub error: Option<EnrichmentError>,
    }

    impl MockArtwork {
        /// Create a mock that returns a placeholder image of `size` bytes.
        pub fn with_placeholder(size: usize) -> Self {
            Self { size, error: None }
        }

        /// Create a mock that returns an error.
        pub fn with_error(error: EnrichmentError) -> Self {
            Self {
                size: 0,
                error: Some(error),
            }
        }
    }

    #[async_trait]
    impl ArtworkFetcher for MockArtwork {
        async fn fetch_artwork(
            &self,
            _candidate: &CandidateMatch,
        ) -> Result<Vec<u8>, EnrichmentError> {
            if let Some(ref err) = self.error {
                return Err(err.clone());
            }
            Ok(vec![0u8; self.size])
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_catalog_empty() {
            let mock = MockCatalog::empty();
            let results = mock.search("anything", 5).await.unwrap();
            assert!(results.is_empty());
            assert_eq!(mock.call_count(), 1);
        }

        #[tokio::test]
        async fn test_mock_catalog_truncates() {
            let mut responses = HashMap::new();
            responses.insert(
                "q".to_string(),
                vec![candidate("a", "b"), candidate("c", "d")],
            );
            let mock = MockCatalog::with_responses(responses);
            assert_eq!(mock.search("q", 1).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_mock_catalog_error() {
            let mock = MockCatalog::with_error(EnrichmentError::Network("timeout".to_string()));
            let result = mock.search("q", 5).await;
            assert!(matches!(result, Err(EnrichmentError::Network(_))));
        }

        #[tokio::test]
        async fn test_mock_artwork() {
            let mock = MockArtwork::with_placeholder(100);
            let bytes = mock.fetch_artwork(&candidate("a", "b")).await.unwrap();
            assert_eq!(bytes.len(), 100);
        }
    }
}

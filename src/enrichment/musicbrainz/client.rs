//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz web service.
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits to 1 req/sec.
//! The client does not throttle; the enrichment executor spaces requests.

use std::time::Duration;

use super::{adapter, dto};
use crate::enrichment::domain::{CandidateMatch, EnrichmentError};

/// MusicBrainz API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
}

/// User agent string - MusicBrainz requires this
const USER_AGENT: &str = concat!(
    "PlayRank/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/playrank)"
);

/// Per-request timeout. A timeout is reported as [`EnrichmentError::Timeout`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "enrichment", "Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

impl MusicBrainzClient {
    /// Create a new client
    pub fn new() -> Self {
        Self::with_base_url("https://musicbrainz.org/ws/2")
    }

    /// Create a client with a custom base URL (mirrors, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: build_http_client(),
            base_url: base_url.into(),
        }
    }

    /// Search recordings by free-text query.
    pub async fn search_recordings(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CandidateMatch>, EnrichmentError> {
        let response = self.send_search_request(query, limit).await?;
        Ok(adapter::to_candidates(response))
    }

    fn search_url(&self, query: &str, limit: usize) -> String {
        format!(
            "{}/recording?query={}&limit={}&fmt=json",
            self.base_url,
            urlencoding::encode(query),
            limit.clamp(1, 100)
        )
    }

    /// Send the HTTP request and parse the response
    async fn send_search_request(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<dto::SearchResponse, EnrichmentError> {
        let url = self.search_url(query, limit);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EnrichmentError::NoMatches);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(EnrichmentError::RateLimited);
        }

        if !status.is_success() {
            // Try to parse error response
            if let Ok(error) = response.json::<dto::ApiError>().await {
                return Err(EnrichmentError::ApiError(error.error));
            }
            return Err(EnrichmentError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<dto::SearchResponse>()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))
    }
}

pub(crate) fn map_request_error(e: reqwest::Error) -> EnrichmentError {
    if e.is_timeout() {
        EnrichmentError::Timeout
    } else {
        EnrichmentError::Network(e.to_string())
    }
}

impl Default for MusicBrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

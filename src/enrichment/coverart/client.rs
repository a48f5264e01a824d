//! Cover Art Archive HTTP client
//!
//! Fetches album artwork from the Cover Art Archive.
//! No API key required, but please respect their rate limits.
//!
//! API: https://coverartarchive.org

use std::time::Duration;

use crate::enrichment::domain::EnrichmentError;
use crate::enrichment::musicbrainz::map_request_error;

/// Desired cover art size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverSize {
    /// 250px thumbnail
    Small,
    /// 500px thumbnail (default)
    #[default]
    Medium,
    /// 1200px thumbnail
    Large,
    /// Original full-size image
    Original,
}

impl CoverSize {
    fn suffix(&self) -> &'static str {
        match self {
            CoverSize::Small => "-250",
            CoverSize::Medium => "-500",
            CoverSize::Large => "-1200",
            CoverSize::Original => "",
        }
    }
}

/// Downloaded cover art
#[derive(Debug, Clone)]
pub struct CoverArt {
    /// Image data (JPEG or PNG)
    pub data: Vec<u8>,
    /// MIME type (image/jpeg or image/png)
    pub mime_type: String,
    /// Source URL
    pub url: String,
}

/// Cover Art Archive client
pub struct CoverArtClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CoverArtClient {
    /// Create a new client
    pub fn new() -> Self {
        Self::with_base_url("https://coverartarchive.org")
    }

    /// Create a client with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    fn front_cover_url(&self, release_id: &str, size: CoverSize) -> String {
        // Use the convenient redirect endpoint
        format!(
            "{}/release/{}/front{}",
            self.base_url,
            release_id,
            size.suffix()
        )
    }

    /// Get the front cover for a MusicBrainz release
    pub async fn get_front_cover(
        &self,
        release_id: &str,
        size: CoverSize,
    ) -> Result<CoverArt, EnrichmentError> {
        let url = self.front_cover_url(release_id, size);
        self.download(&url).await
    }

    /// Download an image from a URL
    ///
    /// Anything that is not an image, or is larger than
    /// [`MAX_IMAGE_BYTES`], is rejected rather than cached.
    pub async fn download(&self, url: &str) -> Result<CoverArt, EnrichmentError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(map_request_error)?;

        check_status(response.status())?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        if !mime_type.starts_with("image/") {
            return Err(EnrichmentError::Parse(format!("unexpected content type {}", mime_type)));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
        {
            return Err(EnrichmentError::Parse("image too large".to_string()));
        }

        let data = response.bytes().await.map_err(map_request_error)?;
        if data.len() > MAX_IMAGE_BYTES {
            return Err(EnrichmentError::Parse("image too large".to_string()));
        }

        Ok(CoverArt {
            data: data.to_vec(),
            mime_type,
            url: url.to_string(),
        })
    }
}

/// Largest image accepted for caching.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

fn check_status(status: reqwest::StatusCode) -> Result<(), EnrichmentError> {
    match status {
        s if s.is_success() => Ok(()),
        reqwest::StatusCode::NOT_FOUND => Err(EnrichmentError::NoMatches),
        reqwest::StatusCode::SERVICE_UNAVAILABLE | reqwest::StatusCode::TOO_MANY_REQUESTS => {
            Err(EnrichmentError::RateLimited)
        }
        s => Err(EnrichmentError::ApiError(format!(
            "HTTP {}: {}",
            s,
            s.canonical_reason().unwrap_or("Unknown")
        ))),
    }
}

impl Default for CoverArtClient {
    fn default() -> Self {
        Self::new()
    }
}

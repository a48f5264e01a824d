//! MusicBrainz API Data Transfer Objects
//!
//! These types match EXACTLY what the MusicBrainz recording search returns.
//! DO NOT add fields that aren't in the API response.
//! DO NOT use these types outside the musicbrainz module - convert to domain types.
//!
//! API Reference: https://musicbrainz.org/doc/MusicBrainz_API/Search

use serde::{Deserialize, Serialize};

/// Recording search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    /// Total number of hits
    #[serde(default)]
    pub count: u32,
    /// Offset of this page
    #[serde(default)]
    pub offset: u32,
    /// Matching recordings, most relevant first
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

/// A recording search hit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Recording {
    /// MusicBrainz recording ID
    pub id: String,
    /// Search relevance (0-100)
    pub score: Option<u32>,
    /// Track title
    pub title: String,
    /// Duration in milliseconds
    pub length: Option<u64>,
    /// Disambiguation comment
    pub disambiguation: Option<String>,
    /// Artist credits
    #[serde(default)]
    pub artist_credit: Vec<ArtistCredit>,
    /// Earliest release date of this recording
    pub first_release_date: Option<String>,
    /// Releases this recording appears on
    #[serde(default)]
    pub releases: Vec<Release>,
    /// Folksonomy tags
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Artist credit (can be multiple for collaborations)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistCredit {
    /// The artist
    pub artist: Artist,
    /// How this artist is credited (may differ from official name)
    pub name: Option<String>,
    /// Join phrase (e.g., " & ", " feat. ")
    pub joinphrase: Option<String>,
}

/// Artist info
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Artist {
    /// MusicBrainz artist ID
    pub id: String,
    /// Official artist name
    pub name: String,
    /// Sort name (e.g., "Beatles, The")
    pub sort_name: Option<String>,
}

/// Release (album/single/EP)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Release {
    /// MusicBrainz release ID
    pub id: String,
    /// Release title
    pub title: String,
    /// Release status (Official, Bootleg, etc.)
    pub status: Option<String>,
    /// Release date (YYYY, YYYY-MM, or YYYY-MM-DD)
    pub date: Option<String>,
    /// Country code
    pub country: Option<String>,
    /// Release group (groups same album across editions)
    pub release_group: Option<ReleaseGroup>,
    /// Total tracks on the release
    pub track_count: Option<u32>,
    /// Media (discs) containing the matched track
    #[serde(default)]
    pub media: Vec<Medium>,
}

/// Release group (e.g., "Abbey Road" across all editions)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseGroup {
    /// MusicBrainz release group ID
    pub id: String,
    /// Primary type (Album, Single, EP, etc.)
    pub primary_type: Option<String>,
}

/// Medium (disc) within a release
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Medium {
    /// Position in release (disc number)
    pub position: Option<u32>,
    /// Format (CD, Vinyl, Digital, etc.)
    pub format: Option<String>,
    /// Number of tracks on this medium
    pub track_count: Option<u32>,
    /// The matched track (search results use the singular key)
    #[serde(default)]
    pub track: Vec<Track>,
}

/// Track on a medium
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    /// MusicBrainz track ID
    pub id: Option<String>,
    /// Track number (may include disc prefix like "1-5")
    pub number: Option<String>,
    /// Track title (may differ from recording title)
    pub title: Option<String>,
    /// Track length in milliseconds
    pub length: Option<u64>,
}

/// Folksonomy tag with vote count
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub count: i32,
    pub name: String,
}

/// Error response from MusicBrainz API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: String,
    pub help: Option<String>,
}

// ============================================================================
// CONTRACT TESTS
// These verify our DTOs match what the real API returns.
// If these fail, the API has changed and we need to update our DTOs.
// ============================================================================

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_empty_search() {
        let json = r#"{"created": "2024-01-01T00:00:00.000Z", "count": 0, "offset": 0, "recordings": []}"#;
        let response: SearchResponse = serde_json::from_str(json).expect("Should parse");
        assert_eq!(response.count, 0);
        assert!(response.recordings.is_empty());
    }

    #[test]
    fn test_parse_search_hit() {
        let json = r#"{
            "count": 1,
            "offset": 0,
            "recordings": [{
                "id": "rec-123",
                "score": 100,
                "title": "Bohemian Rhapsody",
                "length": 354000,
                "artist-credit": [{
                    "name": "Queen",
                    "artist": {"id": "art-1", "name": "Queen", "sort-name": "Queen"}
                }],
                "first-release-date": "1975-10-31",
                "releases": [{
                    "id": "rel-1",
                    "title": "A Night at the Opera",
                    "status": "Official",
                    "date": "1975-11-21",
                    "country": "GB",
                    "track-count": 12,
                    "release-group": {"id": "rg-1", "primary-type": "Album"},
                    "media": [{
                        "position": 1,
                        "format": "CD",
                        "track-count": 12,
                        "track-offset": 10,
                        "track": [{"id": "t-1", "number": "11", "title": "Bohemian Rhapsody", "length": 354000}]
                    }]
                }],
                "tags": [{"count": 7, "name": "progressive rock"}]
            }]
        }"#;

        let response: SearchResponse = serde_json::from_str(json).expect("Should parse");
        let recording = &response.recordings[0];
        assert_eq!(recording.score, Some(100));
        assert_eq!(recording.artist_credit[0].artist.name, "Queen");
        assert_eq!(recording.first_release_date.as_deref(), Some("1975-10-31"));

        let release = &recording.releases[0];
        assert_eq!(release.track_count, Some(12));
        assert_eq!(
            release.release_group.as_ref().and_then(|rg| rg.primary_type.as_deref()),
            Some("Album")
        );
        assert_eq!(release.media[0].track[0].number.as_deref(), Some("11"));
        assert_eq!(recording.tags[0].name, "progressive rock");
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{
            "error": "Invalid query",
            "help": "For usage, please see: https://musicbrainz.org/doc/MusicBrainz_API"
        }"#;

        let error: ApiError = serde_json::from_str(json).expect("Should parse error");
        assert_eq!(error.error, "Invalid query");
        assert!(error.help.is_some());
    }
}

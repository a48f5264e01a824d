//! Core data models for the ranked library.
//!
//! Defines the primary entities: [`LibraryEntry`], its optional
//! [`EnrichmentPayload`], and the [`SortConfiguration`]s the ranked list can
//! be shown under.
//!
//! Entries are rebuilt from the platform media index on every fetch and
//! never mutated afterwards. Equality and hashing only look at
//! [`EntryId`], so an enriched copy can replace the plain one in any keyed
//! container without disturbing list diffing.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Stable identifier of a library entry (derived from the platform's
/// persistent id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build from a numeric persistent id as reported by media indexes.
    pub fn from_persistent_id(id: u64) -> Self {
        Self(format!("{:016x}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque reference to artwork held by the platform (an asset path, URL or
/// media-index token). The core never decodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtworkHandle(pub String);

/// Supplementary metadata obtained from the remote catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentPayload {
    pub genre: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<u32>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Release date as reported by the catalog (YYYY, YYYY-MM or YYYY-MM-DD)
    pub release_date: Option<String>,
    pub composer: Option<String>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_count: Option<u32>,
    pub explicit: bool,
    /// Catalog recording id of the matched candidate
    pub recording_id: Option<String>,
    /// Catalog release id (used for artwork lookups)
    pub release_id: Option<String>,
}

impl EnrichmentPayload {
    /// True when the payload carries anything beyond identifiers.
    pub fn has_enhanced_data(&self) -> bool {
        self.genre.is_some()
            || self.duration_secs.is_some()
            || self.release_date.is_some()
            || self.composer.is_some()
            || self.track_number.is_some()
            || self.disc_number.is_some()
    }

    /// Fill missing fields from `other`, keeping values already present.
    pub fn merge(&mut self, other: &EnrichmentPayload) {
        if self.genre.is_none() { self.genre = other.genre.clone(); }
        if self.duration_secs.is_none() { self.duration_secs = other.duration_secs; }
        if self.artist.is_none() { self.artist = other.artist.clone(); }
        if self.album.is_none() { self.album = other.album.clone(); }
        if self.release_date.is_none() { self.release_date = other.release_date.clone(); }
        if self.composer.is_none() { self.composer = other.composer.clone(); }
        if self.track_number.is_none() { self.track_number = other.track_number; }
        if self.track_count.is_none() { self.track_count = other.track_count; }
        if self.disc_number.is_none() { self.disc_number = other.disc_number; }
        if self.disc_count.is_none() { self.disc_count = other.disc_count; }
        if self.recording_id.is_none() { self.recording_id = other.recording_id.clone(); }
        if self.release_id.is_none() { self.release_id = other.release_id.clone(); }
        self.explicit |= other.explicit;
    }
}

/// One track in the user's library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: EntryId,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Play count reported by the system media index
    pub play_count: u32,
    #[serde(default)]
    pub artwork: Option<ArtworkHandle>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentPayload>,
    #[serde(default)]
    pub hires_artwork: Option<ArtworkHandle>,
}

impl LibraryEntry {
    pub fn new(
        id: impl Into<EntryId>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        play_count: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            play_count,
            artwork: None,
            enrichment: None,
            hires_artwork: None,
        }
    }

    /// A copy of this entry carrying `payload`.
    pub fn with_enrichment(&self, payload: EnrichmentPayload) -> Self {
        Self {
            enrichment: Some(payload),
            ..self.clone()
        }
    }

    /// A copy of this entry carrying a high-resolution artwork handle.
    pub fn with_hires_artwork(&self, handle: ArtworkHandle) -> Self {
        Self {
            hires_artwork: Some(handle),
            ..self.clone()
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.enrichment.is_some()
    }

    /// Artist to display, preferring the catalog's refined value.
    pub fn display_artist(&self) -> &str {
        self.enrichment
            .as_ref()
            .and_then(|e| e.artist.as_deref())
            .unwrap_or(&self.artist)
    }

    /// Album to display, preferring the catalog's refined value.
    pub fn display_album(&self) -> &str {
        self.enrichment
            .as_ref()
            .and_then(|e| e.album.as_deref())
            .unwrap_or(&self.album)
    }

    /// System play count plus a local increment.
    pub fn displayed_play_count(&self, local_increment: u32) -> u32 {
        self.play_count.saturating_add(local_increment)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq for LibraryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LibraryEntry {}

impl Hash for LibraryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Sort configurations
// ============================================================================

/// Field the ranked list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    PlayCount,
    Title,
    Artist,
    Album,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::PlayCount,
        SortKey::Title,
        SortKey::Artist,
        SortKey::Album,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::PlayCount => "play_count",
            SortKey::Title => "title",
            SortKey::Artist => "artist",
            SortKey::Album => "album",
        }
    }
}

/// Ordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub const ALL: [SortDirection; 2] = [SortDirection::Ascending, SortDirection::Descending];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// A (sort key, direction) pair defining one list ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SortConfiguration {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortConfiguration {
    fn default() -> Self {
        Self::new(SortKey::PlayCount, SortDirection::Descending)
    }
}

impl SortConfiguration {
    pub const fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Every possible configuration (key x direction).
    pub fn all() -> Vec<SortConfiguration> {
        SortKey::ALL
            .iter()
            .flat_map(|&key| {
                SortDirection::ALL
                    .iter()
                    .map(move |&direction| SortConfiguration::new(key, direction))
            })
            .collect()
    }

    /// Short stable name, e.g. `play_count_desc`. Used in store keys.
    pub fn slug(&self) -> String {
        format!("{}_{}", self.key.as_str(), self.direction.as_str())
    }

    /// Parse a slug produced by [`SortConfiguration::slug`]. Also accepts
    /// dashes in place of underscores.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let normalized = slug.trim().to_lowercase().replace('-', "_");
        SortConfiguration::all()
            .into_iter()
            .find(|config| config.slug() == normalized)
    }

    /// Order entries under this configuration.
    ///
    /// `play_counts` supplies the displayed play count for an entry. Ties
    /// fall back to title and then id so every ordering is total.
    pub fn sort<'a>(
        &self,
        entries: &'a [LibraryEntry],
        play_counts: impl Fn(&LibraryEntry) -> u32,
    ) -> Vec<&'a LibraryEntry> {
        let mut sorted: Vec<&LibraryEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            let primary = match self.key {
                SortKey::PlayCount => play_counts(a).cmp(&play_counts(b)),
                SortKey::Title => compare_text(&a.title, &b.title),
                SortKey::Artist => compare_text(a.display_artist(), b.display_artist()),
                SortKey::Album => compare_text(a.display_album(), b.display_album()),
            };
            let primary = match self.direction {
                SortDirection::Ascending => primary,
                SortDirection::Descending => primary.reverse(),
            };
            primary
                .then_with(|| compare_text(&a.title, &b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
        sorted
    }
}

impl fmt::Display for SortConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Sort with system play counts plus the given local increments.
pub fn sort_with_increments<'a>(
    entries: &'a [LibraryEntry],
    config: SortConfiguration,
    increments: &HashMap<EntryId, u32>,
) -> Vec<&'a LibraryEntry> {
    config.sort(entries, |entry| {
        entry.displayed_play_count(increments.get(&entry.id).copied().unwrap_or(0))
    })
}

//! Adapter layer: Convert MusicBrainz DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! If MusicBrainz changes their response format, only this file and dto.rs
//! need to change.

use super::dto;
use crate::enrichment::domain::CandidateMatch;
use crate::model::EnrichmentPayload;

/// Convert a search response into candidates, preserving relevance order.
pub fn to_candidates(response: dto::SearchResponse) -> Vec<CandidateMatch> {
    response.recordings.into_iter().map(to_candidate).collect()
}

/// Convert one recording hit into a candidate.
pub fn to_candidate(recording: dto::Recording) -> CandidateMatch {
    let artist = build_artist_string(&recording.artist_credit).unwrap_or_default();
    let release = pick_release(&recording.releases);

    let (track_number, track_count, disc_number) = release
        .and_then(|r| {
            r.media.iter().find_map(|m| {
                m.track.first().map(|t| {
                    (
                        t.number.as_deref().and_then(parse_track_number),
                        m.track_count.or(r.track_count),
                        m.position,
                    )
                })
            })
        })
        .unwrap_or((None, release.and_then(|r| r.track_count), None));

    let release_date = release
        .and_then(|r| r.date.clone())
        .or(recording.first_release_date.clone());

    let explicit = recording
        .disambiguation
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains("explicit"));

    let payload = EnrichmentPayload {
        genre: top_genre(&recording.tags),
        duration_secs: recording.length.map(|ms| (ms / 1000) as u32),
        artist: (!artist.is_empty()).then(|| artist.clone()),
        album: release.map(|r| r.title.clone()),
        release_date,
        composer: None,
        track_number,
        track_count,
        disc_number,
        disc_count: None,
        explicit,
        recording_id: Some(recording.id.clone()),
        release_id: release.map(|r| r.id.clone()),
    };

    CandidateMatch {
        title: recording.title,
        artist,
        album: release.map(|r| r.title.clone()),
        payload,
        artwork_url: None,
    }
}

/// Build a combined artist string from artist credits
fn build_artist_string(credits: &[dto::ArtistCredit]) -> Option<String> {
    if credits.is_empty() {
        return None;
    }

    let mut result = String::new();
    for credit in credits {
        // Use credited name if available, otherwise official name
        let name = credit.name.as_ref().unwrap_or(&credit.artist.name);
        result.push_str(name);

        // Add join phrase if present (e.g., " & ", " feat. ")
        if let Some(ref join) = credit.joinphrase {
            result.push_str(join);
        }
    }

    Some(result)
}

/// Prefer official albums, then any official release, then whatever is first.
fn pick_release(releases: &[dto::Release]) -> Option<&dto::Release> {
    releases
        .iter()
        .find(|r| {
            r.status.as_deref() == Some("Official")
                && r.release_group
                    .as_ref()
                    .and_then(|rg| rg.primary_type.as_deref())
                    == Some("Album")
        })
        .or_else(|| {
            releases
                .iter()
                .find(|r| r.status.as_deref() == Some("Official"))
        })
        .or_else(|| releases.first())
}

/// "5" -> 5, "1-5" -> 5, "A3" -> 3
fn parse_track_number(number: &str) -> Option<u32> {
    let tail = number.rsplit('-').next().unwrap_or(number);
    let digits: String = tail.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Most-voted tag with a positive count, title-cased for display.
fn top_genre(tags: &[dto::Tag]) -> Option<String> {
    tags.iter()
        .filter(|t| t.count > 0)
        .max_by_key(|t| t.count)
        .map(|t| {
            t.name
                .split_whitespace()
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
}

//! Fuzzy (title, artist) matching.
//!
//! Scores how likely a catalog candidate is the same recording as a library
//! entry. Both strings are normalized, compared by edit distance and the
//! title and artist similarities are blended 60/40.

use super::domain::{CandidateMatch, MatchOutcome};

/// Weight of the title similarity in the combined score.
pub const TITLE_WEIGHT: f64 = 0.6;

/// Weight of the artist similarity in the combined score.
pub const ARTIST_WEIGHT: f64 = 0.4;

/// Minimum combined score for a candidate to count as a match.
pub const MATCH_THRESHOLD: f64 = 0.7;

/// Lowercase, keep only `[a-z0-9]` and whitespace, collapse whitespace runs
/// to one space and trim.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classic Levenshtein distance with unit costs.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row DP table
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Similarity ratio of two raw strings in `[0, 1]`.
///
/// Both are normalized first. Two empty strings are identical (`1.0`).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

/// Combined identity score of a candidate against a reference pair.
pub fn score(
    reference_title: &str,
    reference_artist: &str,
    candidate_title: &str,
    candidate_artist: &str,
) -> f64 {
    TITLE_WEIGHT * similarity(reference_title, candidate_title)
        + ARTIST_WEIGHT * similarity(reference_artist, candidate_artist)
}

/// Pick the best candidate for `(title, artist)`.
///
/// The strictly highest score at or above [`MATCH_THRESHOLD`] wins; on ties
/// the first candidate seen is kept.
pub fn best_match(title: &str, artist: &str, candidates: &[CandidateMatch]) -> MatchOutcome {
    let mut best: Option<(&CandidateMatch, f64)> = None;

    for candidate in candidates {
        let s = score(title, artist, &candidate.title, &candidate.artist);
        if s < MATCH_THRESHOLD {
            continue;
        }
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((candidate, s)),
        }
    }

    match best {
        Some((candidate, score)) => MatchOutcome::Matched {
            candidate: candidate.clone(),
            score,
        },
        None => MatchOutcome::NoMatch,
    }
}

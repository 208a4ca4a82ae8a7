//! Tolerant lookup of user-typed identifiers (project names, environment
//! aliases) against a known candidate set.
//!
//! Scoring tiers, strongest first:
//! - candidate starts with input: 90
//! - candidate contains input: 70
//! - input contains candidate: 60
//! - input of at most 4 chars matching the candidate prefix with one mismatch: 50
//! - Levenshtein similarity above 0.4 (short input) or 0.5: `floor(similarity * 50)`
//!
//! Case-insensitive exact matches are never suggested; the caller already has
//! the name. Every function here is pure.

use serde::Serialize;

pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;

pub const SCORE_PREFIX: u32 = 90;
pub const SCORE_CONTAINS: u32 = 70;
pub const SCORE_ABBREVIATION: u32 = 60;
pub const SCORE_SHORT_PREFIX_TYPO: u32 = 50;

const SHORT_INPUT_CHARS: usize = 4;
const SIMILARITY_MIN_SHORT: f64 = 0.4;
const SIMILARITY_MIN: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzyMatch {
    pub candidate: String,
    pub score: u32,
}

/// Best suggestions for `input`, strongest first, at most `max` entries.
pub fn resolve<S: AsRef<str>>(input: &str, candidates: &[S], max: usize) -> Vec<String> {
    scored(input, candidates)
        .into_iter()
        .take(max)
        .map(|m| m.candidate)
        .collect()
}

/// All non-exact candidates with a score, sorted by score descending. Ties keep
/// the candidates' original order.
pub fn scored<S: AsRef<str>>(input: &str, candidates: &[S]) -> Vec<FuzzyMatch> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<FuzzyMatch> = candidates
        .iter()
        .filter_map(|candidate| {
            let candidate = candidate.as_ref();
            let hay = candidate.to_lowercase();
            if hay == needle {
                return None;
            }
            score_candidate(&needle, &hay).map(|score| FuzzyMatch {
                candidate: candidate.to_string(),
                score,
            })
        })
        .collect();
    // `sort_by` is stable, so equal scores keep candidate order.
    out.sort_by(|a, b| b.score.cmp(&a.score));
    out
}

/// Exact (case-insensitive) match if present, otherwise the top fuzzy
/// suggestion scoring at least `min_score`.
pub fn best_match<'a, S: AsRef<str>>(
    input: &str,
    candidates: &'a [S],
    min_score: u32,
) -> Option<&'a str> {
    let needle = input.trim();
    if needle.is_empty() {
        return None;
    }
    let names: Vec<&'a str> = candidates.iter().map(|c| c.as_ref()).collect();
    if let Some(exact) = names.iter().find(|c| c.eq_ignore_ascii_case(needle)) {
        return Some(*exact);
    }
    let top = scored(needle, &names).into_iter().next()?;
    if top.score < min_score {
        return None;
    }
    names.into_iter().find(|c| *c == top.candidate)
}

fn score_candidate(needle: &str, hay: &str) -> Option<u32> {
    if hay.starts_with(needle) {
        return Some(SCORE_PREFIX);
    }
    if hay.contains(needle) {
        return Some(SCORE_CONTAINS);
    }
    if needle.contains(hay) {
        return Some(SCORE_ABBREVIATION);
    }

    let needle_len = needle.chars().count();
    if needle_len <= SHORT_INPUT_CHARS && prefix_mismatches(needle, hay) == Some(1) {
        return Some(SCORE_SHORT_PREFIX_TYPO);
    }

    let sim = similarity(needle, hay);
    let threshold = if needle_len <= SHORT_INPUT_CHARS {
        SIMILARITY_MIN_SHORT
    } else {
        SIMILARITY_MIN
    };
    if sim > threshold {
        return Some((sim * 50.0).floor() as u32);
    }
    None
}

/// Number of differing characters between `needle` and the first
/// `needle.len()` characters of `hay`; `None` when `hay` is shorter.
fn prefix_mismatches(needle: &str, hay: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    let prefix: Vec<char> = hay.chars().take(needle.len()).collect();
    if prefix.len() < needle.len() {
        return None;
    }
    Some(needle.iter().zip(&prefix).filter(|(a, b)| a != b).count())
}

/// `(max_len - distance) / max_len`, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

/// Classic Levenshtein distance; insert, delete and substitute all cost 1.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        d[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            d[i][j] = (d[i - 1][j] + 1)
                .min(d[i][j - 1] + 1)
                .min(d[i - 1][j - 1] + cost);
        }
    }
    d[a.len()][b.len()]
}

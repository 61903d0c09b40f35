//! Fuzzy label matching against catalog vocabularies.
//!
//! Model output is free text; catalog labels are canonical. The matcher maps
//! one onto the other using normalized Levenshtein similarity, so "Hardware
//! support" or "Hardwre Support" still lands on "Hardware Support" while
//! "Laptop Issues" does not. Pure functions, no state.

/// Minimum similarity for a fuzzy candidate to count as a match.
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Outcome of resolving a raw label against a candidate vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// The canonical catalog label, exactly as the catalog spells it.
    pub label: String,
    /// True when the normalized forms were identical (similarity 1.0).
    pub exact: bool,
}

/// Resolve `raw` against `candidates`.
///
/// Returns the best-scoring candidate at or above the similarity threshold,
/// or `None` if no candidate qualifies. Ties on score are broken by picking
/// the lexicographically smallest candidate, so resolution is deterministic
/// regardless of catalog order.
pub fn resolve(raw: &str, candidates: &[String]) -> Option<Match> {
    let needle = normalize(raw);
    if needle.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &String)> = None;
    for candidate in candidates {
        let score = similarity(&needle, &normalize(candidate));
        if score < SIMILARITY_THRESHOLD {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_score, best_label)) => {
                score > best_score || (score == best_score && candidate < best_label)
            }
        };
        if better {
            best = Some((score, candidate));
        }
    }

    best.map(|(score, label)| Match {
        label: label.clone(),
        exact: score == 1.0,
    })
}

/// Canonical form used for comparison: lowercased, trimmed, inner whitespace
/// runs collapsed to a single space.
fn normalize(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in `[0, 1]`: 1.0 for identical strings, scaled down by edit
/// distance relative to the longer string.
fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

/// Character-level Levenshtein distance, single-row dynamic programming.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

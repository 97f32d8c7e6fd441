//! String similarity utilities shared by merchant resolution and
//! transfer scoring.
//!
//! Two measures are provided:
//! - `levenshtein_similarity`: edit-distance ratio in [0,1], good for
//!   near-identical strings ("SWIGGI" vs "SWIGGY").
//! - `token_set_ratio`: order-insensitive token comparison, good for
//!   descriptions that embed the merchant name among noise
//!   ("NETFLIX COM AMSTERDAM" vs "Netflix").

use std::collections::BTreeSet;

/// Levenshtein edit distance between two strings, by character.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single-row dynamic programming
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Levenshtein similarity in the range [0.0, 1.0].
pub fn levenshtein_similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }

    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - (levenshtein_distance(s1, s2) as f64 / max_len as f64)
}

/// Token-set ratio in the range [0.0, 1.0].
///
/// Splits both strings into alphanumeric word sets and compares the
/// sorted intersection against each side's full sorted token string.
/// A string fully contained in the other scores 1.0 regardless of the
/// surrounding tokens, which is the property merchant matching needs.
pub fn token_set_ratio(s1: &str, s2: &str) -> f64 {
    let t1 = tokens(s1);
    let t2 = tokens(s2);

    if t1.is_empty() || t2.is_empty() {
        return if t1 == t2 { 1.0 } else { 0.0 };
    }

    let intersection: BTreeSet<&str> = t1.intersection(&t2).copied().collect();
    let diff_1to2: BTreeSet<&str> = t1.difference(&t2).copied().collect();
    let diff_2to1: BTreeSet<&str> = t2.difference(&t1).copied().collect();

    let sect = join(&intersection);
    let combined_1 = join_parts(&sect, &join(&diff_1to2));
    let combined_2 = join_parts(&sect, &join(&diff_2to1));

    let a = levenshtein_similarity(&sect, &combined_1);
    let b = levenshtein_similarity(&sect, &combined_2);
    let c = levenshtein_similarity(&combined_1, &combined_2);

    a.max(b).max(c)
}

/// Fraction of the smaller token set shared with the larger one, in [0,1].
///
/// Used by transfer scoring to detect descriptions that mention the
/// same counterparty on both sides.
pub fn token_overlap(s1: &str, s2: &str) -> f64 {
    let t1 = tokens(s1);
    let t2 = tokens(s2);

    let min_len = t1.len().min(t2.len());
    if min_len == 0 {
        return 0.0;
    }

    let shared = t1.intersection(&t2).count();
    shared as f64 / min_len as f64
}

fn tokens(s: &str) -> BTreeSet<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn join(set: &BTreeSet<&str>) -> String {
    set.iter().copied().collect::<Vec<_>>().join(" ")
}

fn join_parts(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{} {}", a, b)
    }
}

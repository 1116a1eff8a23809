//! Nickname canonicalization and fuzzy identity matching.
//!
//! War uploads carry free-text nicknames typed by players, so the same
//! person shows up as "Lk-Lk!", "lklk" or "lk lk" across screenshots.
//! Everything here operates on the canonical form: lowercase, `[a-z0-9]`
//! only.

use strsim::levenshtein;

/// Canonical form of a nickname: lowercased, stripped of everything outside
/// `[a-z0-9]`. Idempotent.
pub fn normalize(nick: &str) -> String {
    nick.chars()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Levenshtein distance between the canonical forms of `a` and `b`.
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(&normalize(a), &normalize(b))
}

/// Edit-distance budget for a pair of canonical lengths. Short names get no
/// fuzziness at all (too collision-prone), longer names tolerate typos up to
/// 30% of the shorter length, capped at 3.
fn adaptive_threshold(min_len: usize) -> usize {
    match min_len {
        0..=2 => 0,
        3..=4 => 1,
        5..=6 => 2,
        n => 3.min(n * 3 / 10),
    }
}

/// Whether two nicknames plausibly belong to the same player.
///
/// With `threshold = None` the budget is derived from the shorter canonical
/// form via [`adaptive_threshold`].
pub fn same_identity(a: &str, b: &str, threshold: Option<usize>) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    let threshold = threshold.unwrap_or_else(|| adaptive_threshold(na.len().min(nb.len())));
    levenshtein(&na, &nb) <= threshold
}

/// Search-ranking priority of `candidate` against `query`, lower is better:
/// exact canonical match = 0, canonical prefix = 1, canonical substring = 2,
/// within the adaptive edit budget = 3 + distance. `None` means no match.
pub fn match_rank(query: &str, candidate: &str) -> Option<usize> {
    let q = normalize(query);
    let c = normalize(candidate);

    if c == q {
        return Some(0);
    }
    if c.starts_with(&q) {
        return Some(1);
    }
    if c.contains(&q) {
        return Some(2);
    }
    let dist = levenshtein(&q, &c);
    if dist <= adaptive_threshold(q.len().min(c.len())) {
        return Some(3 + dist);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_case_and_punctuation() {
        assert_eq!(normalize("Lk-Lk!"), "lklk");
        assert_eq!(normalize("Lk-Lk!"), normalize("lklk"));
        assert_eq!(normalize(&normalize("Gúi Oliveira_BR")), normalize("Gúi Oliveira_BR"));
    }

    #[test]
    fn edit_distance_works_on_canonical_forms() {
        assert_eq!(edit_distance("Lk-Lk!", "lklk"), 0);
        assert_eq!(edit_distance("guilherme", "guilheme"), 1);
        assert_eq!(edit_distance("abc", ""), 3);
    }

    #[test]
    fn short_names_tolerate_no_edits() {
        assert!(!same_identity("ab", "cd", None));
        assert!(same_identity("ab", "AB", None));
    }

    #[test]
    fn long_names_tolerate_typos() {
        assert!(same_identity("guilherme", "guilheme", None));
        assert!(!same_identity("guilherme", "completely", None));
    }

    #[test]
    fn explicit_threshold_overrides_adaptive() {
        assert!(same_identity("ab", "ac", Some(1)));
        assert!(!same_identity("guilherme", "guilheme", Some(0)));
    }

    #[test]
    fn match_rank_orders_exact_prefix_substring_fuzzy() {
        assert_eq!(match_rank("lklk", "Lk-Lk!"), Some(0));
        assert_eq!(match_rank("lk", "lklk"), Some(1));
        assert_eq!(match_rank("kl", "lklk"), Some(2));
        assert_eq!(match_rank("guilheme", "guilherme"), Some(4));
        assert_eq!(match_rank("xyz", "lklk"), None);
    }
}

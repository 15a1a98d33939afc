//! Approximate string scoring and top-K ranking
//!
//! `weighted_ratio` follows the fuzzywuzzy/FuzzySharp `WRatio` recipe: plain
//! similarity, partial (substring window) similarity and two token-based
//! variants, each scaled, with the best one winning. Token variants make the
//! score independent of word order, so "web contoso" still finds "Contoso-Web".

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

const UNBASE_SCALE: f64 = 0.95;
const PARTIAL_SCALE: f64 = 0.9;
const LONG_PARTIAL_SCALE: f64 = 0.6;

/// Lowercase, replace every non-alphanumeric character with a space, trim
pub fn full_process(s: &str) -> String {
    let mut mapped = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            mapped.extend(c.to_lowercase());
        } else {
            mapped.push(' ');
        }
    }
    mapped.trim().to_string()
}

fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b) * 100.0
}

/// Best ratio of the shorter string against every same-length window of the longer one
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();

    if short_len == 0 {
        return 0.0;
    }
    if short_len == long_chars.len() {
        return ratio(short, long);
    }

    let mut best = 0.0_f64;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_sort_ratio(a: &str, b: &str, partial: bool) -> f64 {
    let (sa, sb) = (sorted_tokens(a), sorted_tokens(b));
    if partial {
        partial_ratio(&sa, &sb)
    } else {
        ratio(&sa, &sb)
    }
}

fn token_set_ratio(a: &str, b: &str, partial: bool) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let join = |set: Vec<&str>| set.join(" ");
    let sect = join(tokens_a.intersection(&tokens_b).copied().collect());
    let diff_ab = join(tokens_a.difference(&tokens_b).copied().collect());
    let diff_ba = join(tokens_b.difference(&tokens_a).copied().collect());

    let combined_ab = format!("{} {}", sect, diff_ab).trim().to_string();
    let combined_ba = format!("{} {}", sect, diff_ba).trim().to_string();

    let score: fn(&str, &str) -> f64 = if partial { partial_ratio } else { ratio };
    score(&sect, &combined_ab)
        .max(score(&sect, &combined_ba))
        .max(score(&combined_ab, &combined_ba))
}

/// Score of two already-processed strings, 0..=100
fn weighted_ratio_processed(p1: &str, p2: &str) -> u8 {
    if p1.is_empty() || p2.is_empty() {
        return 0;
    }

    let base = ratio(p1, p2);
    let (len1, len2) = (p1.chars().count() as f64, p2.chars().count() as f64);
    let len_ratio = len1.max(len2) / len1.min(len2);

    let best = if len_ratio < 1.5 {
        base.max(token_sort_ratio(p1, p2, false) * UNBASE_SCALE)
            .max(token_set_ratio(p1, p2, false) * UNBASE_SCALE)
    } else {
        let partial_scale = if len_ratio > 8.0 {
            LONG_PARTIAL_SCALE
        } else {
            PARTIAL_SCALE
        };
        base.max(partial_ratio(p1, p2) * partial_scale)
            .max(token_sort_ratio(p1, p2, true) * UNBASE_SCALE * partial_scale)
            .max(token_set_ratio(p1, p2, true) * UNBASE_SCALE * partial_scale)
    };

    best.round().clamp(0.0, 100.0) as u8
}

/// Token-order-independent similarity of `query` and `choice`, 0..=100
pub fn weighted_ratio(query: &str, choice: &str) -> u8 {
    weighted_ratio_processed(&full_process(query), &full_process(choice))
}

/// Positions of the `limit` best candidates for `query`, best first
///
/// Every candidate is scored (no substring pre-filter); ties keep input order.
/// An empty query scores everything 0, so the result is the first `limit`
/// candidates as given.
pub fn rank<S: AsRef<str>>(candidates: &[S], query: &str, limit: usize) -> Vec<usize> {
    let processed_query = full_process(query);

    let mut scored: Vec<(usize, u8)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            (
                i,
                weighted_ratio_processed(&processed_query, &full_process(c.as_ref())),
            )
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(limit);
    scored.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(candidates: &[&str], query: &str, limit: usize) -> Vec<String> {
        rank(candidates, query, limit)
            .into_iter()
            .map(|i| candidates[i].to_string())
            .collect()
    }

    const APPS: [&str; 3] = ["Contoso-API", "Contoso-Web", "Fabrikam-App"];

    #[test]
    fn test_full_process_normalises() {
        assert_eq!(full_process("  Contoso-API_v2! "), "contoso api v2");
        assert_eq!(full_process("---"), "");
    }

    #[test]
    fn test_contoso_query_keeps_contoso_apps() {
        assert_eq!(names(&APPS, "Contoso", 2), vec!["Contoso-API", "Contoso-Web"]);
    }

    #[test]
    fn test_empty_candidates_rank_empty() {
        let empty: [&str; 0] = [];
        assert!(rank(&empty, "anything", 10).is_empty());
        assert!(rank(&empty, "", 10).is_empty());
    }

    #[test]
    fn test_empty_query_keeps_input_order() {
        assert_eq!(names(&APPS, "", 10), APPS.to_vec());
        assert_eq!(names(&APPS, "", 2), vec!["Contoso-API", "Contoso-Web"]);
    }

    #[test]
    fn test_limit_larger_than_candidates_returns_all() {
        let ranked = rank(&APPS, "fab", 50);
        assert_eq!(ranked.len(), 3);
        assert_eq!(APPS[ranked[0]], "Fabrikam-App");
    }

    #[test]
    fn test_ranking_is_idempotent() {
        let many: Vec<String> = (0..40).map(|i| format!("service-{}-app", i)).collect();
        assert_eq!(rank(&many, "srv 1", 10), rank(&many, "srv 1", 10));
    }

    #[test]
    fn test_results_are_bounded_members() {
        let many: Vec<String> = (0..25).map(|i| format!("Identity {}", i)).collect();
        for query in ["", "i", "identity 9", "zzz"] {
            let ranked = rank(&many, query, 10);
            assert!(ranked.len() <= 10.min(many.len()));
            assert!(ranked.iter().all(|&i| i < many.len()));
        }
    }

    #[test]
    fn test_word_order_does_not_matter() {
        assert_eq!(names(&APPS, "web contoso", 1), vec!["Contoso-Web"]);
    }

    #[test]
    fn test_tolerates_typos() {
        let ranked = names(&APPS, "contsoo", 3);
        assert_eq!(ranked[2], "Fabrikam-App");
    }

    #[test]
    fn test_duplicates_stay_distinct() {
        let dupes = ["orders-api", "billing", "orders-api"];
        assert_eq!(rank(&dupes, "orders", 3), vec![0, 2, 1]);
    }

    #[test]
    fn test_identical_strings_score_full() {
        assert_eq!(weighted_ratio("Contoso Web", "contoso-web"), 100);
        assert_eq!(weighted_ratio("", "contoso"), 0);
    }
}

//! Fuzzy "did you mean" ranking over registered tool names.

use std::cmp::Ordering;

/// Default number of suggestions attached to a not-found error.
pub const MAX_SUGGESTIONS: usize = 5;

const SUBSTRING_BONUS: f64 = 0.3;

/// Ranks `candidates` by similarity to `query`, best first.
///
/// Each candidate is scored against both its full name and the segment after
/// the last dot, so `read_fle` finds `core.read_file`. Ties keep candidate
/// order. Candidates with no similarity at all are dropped.
#[must_use]
pub fn suggest<'a, I>(query: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let query = query.to_lowercase();
    let query_base = base_of(&query);

    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|candidate| {
            let lowered = candidate.to_lowercase();
            let score = similarity(&query, &lowered)
                .max(similarity(query_base, base_of(&lowered)));
            (score, candidate)
        })
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_owned())
        .collect()
}

/// Normalized similarity in `[0, 1]` with a bonus for substring matches.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let longest = a_len.max(b_len);
    #[allow(clippy::cast_precision_loss)]
    let base = 1.0 - levenshtein(a, b) as f64 / longest as f64;
    let bonus = if a.contains(b) || b.contains(a) {
        SUBSTRING_BONUS
    } else {
        0.0
    };
    (base + bonus).min(1.0)
}

fn base_of(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn typo_ranks_target_first() {
        let names = ["core.write_file", "core.read_file", "custom.get_weather"];
        let ranked = suggest("read_fle", names, MAX_SUGGESTIONS);
        assert_eq!(ranked.first().map(String::as_str), Some("core.read_file"));
    }

    #[test]
    fn substring_match_gets_bonus() {
        assert!(similarity("weather", "get_weather") > similarity("weather", "get_leather"));
    }

    #[test]
    fn caps_result_count() {
        let names: Vec<String> = (0..20).map(|i| format!("tool_{i}")).collect();
        let ranked = suggest("tool", names.iter().map(String::as_str), MAX_SUGGESTIONS);
        assert_eq!(ranked.len(), MAX_SUGGESTIONS);
    }
}

//! Properties of subset containment over literal entries.

use mock_matcher::predicate::{contains_subset, PatternComparator, PatternEntry};
use proptest::prelude::*;
use proptest::sample::subsequence;

fn entries() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-c]", "[0-9]"), 0..12)
}

fn patterns(pairs: &[(String, String)]) -> Vec<PatternEntry> {
    pairs
        .iter()
        .map(|(k, v)| PatternEntry::new(k.as_str(), v.as_str()))
        .collect()
}

fn candidates(pairs: &[(String, String)]) -> Vec<PatternEntry> {
    pairs
        .iter()
        .map(|(k, v)| PatternEntry::literal(k.clone(), v.clone()))
        .collect()
}

fn small_patterns() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["a", "b"]),
            prop::sample::select(vec!["1", "2", "3", "[0-9]", "[12]"]),
        )
            .prop_map(|(k, v)| (k.to_string(), v.to_string())),
        0..5,
    )
}

fn small_candidates() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[ab]", "[1-3]"), 0..6)
}

fn value_matches(pattern: &str, candidate: &str) -> bool {
    match pattern {
        "[0-9]" => true,
        "[12]" => candidate == "1" || candidate == "2",
        _ => pattern == candidate,
    }
}

/// Exhaustive search for an assignment giving each pattern its own candidate.
fn injective_assignment_exists(patterns: &[(String, String)], candidates: &[(String, String)], used: &mut Vec<bool>) -> bool {
    let Some(((key, value), rest)) = patterns.split_first() else {
        return true;
    };
    for (i, (k, v)) in candidates.iter().enumerate() {
        if used[i] || k != key || !value_matches(value, v) {
            continue;
        }
        used[i] = true;
        let found = injective_assignment_exists(rest, candidates, used);
        used[i] = false;
        if found {
            return true;
        }
    }
    false
}

proptest! {
    #[test]
    fn test_agrees_with_exhaustive_assignment(pats in small_patterns(), cands in small_candidates()) {
        let comparator = PatternComparator::default();
        let expected = injective_assignment_exists(&pats, &cands, &mut vec![false; cands.len()]);
        prop_assert_eq!(contains_subset(None, &comparator, &patterns(&pats), &candidates(&cands)), expected);
    }

    #[test]
    fn test_any_subsequence_is_contained(
        (all, picked) in entries().prop_flat_map(|all| {
            let len = all.len();
            (Just(all.clone()), subsequence(all, 0..=len))
        })
    ) {
        let comparator = PatternComparator::default();
        prop_assert!(contains_subset(None, &comparator, &patterns(&picked), &candidates(&all)));
    }

    #[test]
    fn test_each_candidate_used_once(all in entries(), extra in ("[a-c]", "[0-9]")) {
        let comparator = PatternComparator::default();
        let available = all.iter().filter(|pair| **pair == extra).count();
        let demanded = vec![extra; available + 1];
        prop_assert!(!contains_subset(None, &comparator, &patterns(&demanded), &candidates(&all)));
    }

    #[test]
    fn test_order_does_not_matter(all in entries()) {
        let comparator = PatternComparator::default();
        let mut reversed = all.clone();
        reversed.reverse();
        prop_assert!(contains_subset(None, &comparator, &patterns(&reversed), &candidates(&all)));
    }
}

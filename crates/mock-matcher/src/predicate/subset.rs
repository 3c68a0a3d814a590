//! Subset containment for multi-valued request attributes.
//!
//! Decides whether every pattern entry is satisfied by the candidate entries,
//! with two refinements over a naive "each pattern has some match" check:
//!
//! - a negated key (`!x-debug`) fails the whole check if that key is present
//! - each candidate entry can satisfy at most one required pattern entry, so
//!   two identical required patterns need two candidate entries; the
//!   assignment is a maximum bipartite matching, not a greedy pick
//!
//! Per pattern entry the checks run in a fixed order: collect matching
//! candidate indexes, decide optional-and-absent, decide negated-and-present,
//! then fail if nothing matched (and the entry is not optional and absent) or
//! the forbidden key is present.

use super::comparator::PatternComparator;
use super::diagnostics::{diff, MatchDiagnostics};
use super::entry::PatternEntry;
use super::nottable::NottableValue;

/// Whether `candidates` contains every entry of `patterns`.
pub fn contains_subset(
    mut diagnostics: Option<&mut MatchDiagnostics>,
    comparator: &PatternComparator,
    patterns: &[PatternEntry],
    candidates: &[PatternEntry],
) -> bool {
    // Candidate indexes each required pattern entry may claim
    let mut required: Vec<Vec<usize>> = Vec::new();

    for pattern in patterns {
        let matching_indexes = matching_indexes(comparator, pattern, candidates);
        let optional_and_absent = pattern.is_optional() && !contains_key(comparator, pattern, candidates);
        let notted_and_present = notted_and_present(comparator, pattern, candidates);

        if notted_and_present {
            diff!(
                diagnostics,
                "forbidden key {} is present in {}",
                pattern.key().value(),
                render(candidates)
            );
            return false;
        }
        if matching_indexes.is_empty() && !optional_and_absent {
            diff!(
                diagnostics,
                "no entry matched {} in {}",
                pattern,
                render(candidates)
            );
            return false;
        }
        if !optional_and_absent && !pattern.is_notted() {
            required.push(matching_indexes);
        }
    }

    let matched = maximum_matching(&required, candidates.len())
        .iter()
        .filter(|assigned| assigned.is_some())
        .count();
    if matched < required.len() {
        diff!(
            diagnostics,
            "{} required entries matched only {} distinct entries in {}",
            required.len(),
            matched,
            render(candidates)
        );
        return false;
    }
    true
}

/// Bipartite matching of left items onto right items (augmenting paths).
///
/// `edges[i]` lists the right indexes left item `i` may take. Returns, for
/// each left item, the right index assigned to it.
pub(crate) fn maximum_matching(edges: &[Vec<usize>], right_len: usize) -> Vec<Option<usize>> {
    fn augment(i: usize, edges: &[Vec<usize>], owner: &mut [Option<usize>], visited: &mut [bool]) -> bool {
        for &j in &edges[i] {
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let free = match owner[j] {
                None => true,
                Some(k) => augment(k, edges, owner, visited),
            };
            if free {
                owner[j] = Some(i);
                return true;
            }
        }
        false
    }

    let mut owner: Vec<Option<usize>> = vec![None; right_len];
    for i in 0..edges.len() {
        let mut visited = vec![false; right_len];
        augment(i, edges, &mut owner, &mut visited);
    }

    let mut assignment = vec![None; edges.len()];
    for (j, i) in owner.iter().enumerate() {
        if let Some(i) = i {
            assignment[*i] = Some(j);
        }
    }
    assignment
}

/// Indexes of candidates whose key and value both match `pattern`.
fn matching_indexes(
    comparator: &PatternComparator,
    pattern: &PatternEntry,
    candidates: &[PatternEntry],
) -> Vec<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| {
            comparator.matches_quietly(pattern.key(), candidate.key())
                && comparator.matches_quietly(pattern.value(), candidate.value())
        })
        .map(|(index, _)| index)
        .collect()
}

/// Whether any candidate key matches the pattern key, ignoring values.
fn contains_key(
    comparator: &PatternComparator,
    pattern: &PatternEntry,
    candidates: &[PatternEntry],
) -> bool {
    candidates
        .iter()
        .any(|candidate| comparator.matches_quietly(pattern.key(), candidate.key()))
}

/// Whether a negated pattern key is actually present among plain candidate keys.
fn notted_and_present(
    comparator: &PatternComparator,
    pattern: &PatternEntry,
    candidates: &[PatternEntry],
) -> bool {
    if !pattern.key().is_negated() {
        return false;
    }
    let forbidden = NottableValue::new(pattern.key().value());
    candidates
        .iter()
        .filter(|candidate| !candidate.key().is_negated())
        .any(|candidate| comparator.matches_quietly(&forbidden, candidate.key()))
}

fn render(entries: &[PatternEntry]) -> String {
    let parts: Vec<String> = entries.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

//! Concurrent writers and readers against the bounded store and the registry.

use mock_matcher::predicate::body::JsonMatchType;
use mock_matcher::predicate::PatternComparator;
use mock_matcher::store::BoundedDualOrderedStore;
use mock_matcher::{Expectation, HttpRequest, RequestDefinition, RequestMatchers};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

const WRITERS: usize = 8;
const PER_WRITER: usize = 200;

#[test]
fn test_store_stays_bounded_under_concurrent_adds() {
    let store: Arc<BoundedDualOrderedStore<usize, usize, usize>> =
        Arc::new(BoundedDualOrderedStore::new(100, |v: &usize| *v, |v: &usize| v % 17));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                let mut evicted = 0;
                for i in 0..PER_WRITER {
                    if store.add(w * PER_WRITER + i).is_some() {
                        evicted += 1;
                    }
                }
                evicted
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let seen: Vec<usize> = store.stream_in_priority_order().collect();
                    assert!(seen.len() <= 100);
                    assert!(seen.windows(2).all(|w| w[0] % 17 <= w[1] % 17));
                }
            })
        })
        .collect();

    let evicted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(store.size(), 100);
    assert_eq!(evicted, WRITERS * PER_WRITER - 100);

    let by_priority: Vec<usize> = store.stream_in_priority_order().collect();
    let by_insertion = store.values_in_insertion_order();
    assert_eq!(by_priority.len(), 100);
    assert_eq!(
        by_priority.iter().collect::<HashSet<_>>(),
        by_insertion.iter().collect::<HashSet<_>>()
    );
}

#[test]
fn test_concurrent_remove_and_priority_toggle() {
    let store: Arc<BoundedDualOrderedStore<usize, usize, usize>> =
        Arc::new(BoundedDualOrderedStore::new(1000, |v: &usize| *v, |v: &usize| *v));
    for i in 0..1000 {
        store.add(i);
    }

    let removers: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in (t..1000).step_by(8) {
                    assert!(store.remove_by_key(&i));
                }
            })
        })
        .collect();
    let togglers: Vec<_> = (4..8)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in (t..1000).step_by(8) {
                    assert!(store.remove_priority_key(&i));
                    assert!(store.add_priority_key(&i));
                }
            })
        })
        .collect();
    for handle in removers.into_iter().chain(togglers) {
        handle.join().unwrap();
    }

    assert_eq!(store.size(), 500);
    let ordered: Vec<usize> = store.stream_in_priority_order().collect();
    assert_eq!(ordered.len(), 500);
    assert!(ordered.windows(2).all(|w| w[0] < w[1]));
    assert!(ordered.iter().all(|v| v % 8 >= 4));
}

#[test]
fn test_registry_matches_while_updating() {
    let registry = Arc::new(RequestMatchers::new(
        50,
        PatternComparator::default(),
        false,
        JsonMatchType::OnlyMatchingFields,
    ));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let definition = RequestDefinition::new()
                        .with_method("GET")
                        .with_path(&format!("/w{w}/{}", i % 60));
                    let expectation =
                        Expectation::new(definition).with_id(format!("w{w}-{}", i % 60));
                    registry.add(expectation).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|w| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let path = format!("/w{w}/{}", i % 60);
                    if let Some(matcher) = registry.first_match(&HttpRequest::new("GET", &path)) {
                        assert!(matcher.id().starts_with(&format!("w{w}-")));
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    assert_eq!(registry.len(), 50);
}

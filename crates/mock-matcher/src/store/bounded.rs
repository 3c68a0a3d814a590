//! Capacity-limited store ordered both by insertion and by priority.
//!
//! Three structures are kept in step:
//! - a key map for direct lookup and update
//! - a priority-ordered set used for match attempts
//! - an insertion-ordered queue used to pick the eviction victim
//!
//! Each structure has its own lock, so lookups and priority iteration never
//! wait on each other. Mutations are serialised by a separate writer lock and
//! always take the structure locks in the same order (key map, priority set,
//! insertion queue).

use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Position in the priority order.
///
/// Ordered by the caller-supplied priority key, then by insertion sequence so
/// that equal priorities keep a stable order.
#[derive(Debug, Clone)]
struct PriorityEntry<P, K> {
    priority: P,
    sequence: u64,
    key: K,
}

impl<P: Ord, K> PartialEq for PriorityEntry<P, K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<P: Ord, K> Eq for PriorityEntry<P, K> {}

impl<P: Ord, K> PartialOrd for PriorityEntry<P, K> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<P: Ord, K> Ord for PriorityEntry<P, K> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then(self.sequence.cmp(&other.sequence))
    }
}

#[derive(Debug)]
struct Slot<V, P, K> {
    value: V,
    entry: PriorityEntry<P, K>,
    /// Cleared by `remove_priority_key`
    prioritised: bool,
}

type KeyFn<V, K> = Box<dyn Fn(&V) -> K + Send + Sync>;
type PriorityFn<V, P> = Box<dyn Fn(&V) -> P + Send + Sync>;

/// Bounded store of values addressable by key and iterable by priority.
///
/// `max_size == 0` disables the store: every `add` is ignored.
pub struct BoundedDualOrderedStore<K, V, P> {
    max_size: usize,
    key_of: KeyFn<V, K>,
    priority_of: PriorityFn<V, P>,
    writer: Mutex<()>,
    by_key: RwLock<HashMap<K, Slot<V, P, K>>>,
    priority_order: RwLock<BTreeSet<PriorityEntry<P, K>>>,
    insertion_order: Mutex<VecDeque<K>>,
    sequence: AtomicU64,
}

impl<K, V, P> fmt::Debug for BoundedDualOrderedStore<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedDualOrderedStore")
            .field("max_size", &self.max_size)
            .field("size", &self.by_key.read().len())
            .finish()
    }
}

impl<K, V, P> BoundedDualOrderedStore<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: Ord + Clone,
{
    /// Create a store.
    ///
    /// `key_of` extracts the lookup key and `priority_of` the priority key;
    /// iteration yields ascending priority keys.
    pub fn new(
        max_size: usize,
        key_of: impl Fn(&V) -> K + Send + Sync + 'static,
        priority_of: impl Fn(&V) -> P + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_size,
            key_of: Box::new(key_of),
            priority_of: Box::new(priority_of),
            writer: Mutex::new(()),
            by_key: RwLock::new(HashMap::new()),
            priority_order: RwLock::new(BTreeSet::new()),
            insertion_order: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_disabled(&self) -> bool {
        self.max_size == 0
    }

    /// Insert `value`, or replace the value stored under the same key.
    ///
    /// A replacement keeps its insertion position and is re-sorted by its new
    /// priority. Returns the value evicted to stay within `max_size`, if any.
    pub fn add(&self, value: V) -> Option<V> {
        if self.is_disabled() {
            trace!("store disabled, ignoring add");
            return None;
        }
        let key = (self.key_of)(&value);
        let priority = (self.priority_of)(&value);

        let _writer = self.writer.lock();
        let mut by_key = self.by_key.write();
        let mut priority_order = self.priority_order.write();

        if let Some(slot) = by_key.get_mut(&key) {
            let sequence = slot.entry.sequence;
            if slot.prioritised {
                priority_order.remove(&slot.entry);
            }
            slot.entry = PriorityEntry {
                priority,
                sequence,
                key: key.clone(),
            };
            slot.value = value;
            if slot.prioritised {
                priority_order.insert(slot.entry.clone());
            }
            return None;
        }

        let entry = PriorityEntry {
            priority,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            key: key.clone(),
        };
        priority_order.insert(entry.clone());
        by_key.insert(
            key.clone(),
            Slot {
                value,
                entry,
                prioritised: true,
            },
        );

        let mut insertion_order = self.insertion_order.lock();
        insertion_order.push_back(key);
        if insertion_order.len() <= self.max_size {
            return None;
        }

        let oldest = insertion_order.pop_front()?;
        let evicted = by_key.remove(&oldest)?;
        if evicted.prioritised {
            priority_order.remove(&evicted.entry);
        }
        debug!(max_size = self.max_size, "store full, evicted oldest entry");
        Some(evicted.value)
    }

    /// Remove `value` (by its key). Returns whether it was present.
    pub fn remove(&self, value: &V) -> bool {
        let key = (self.key_of)(value);
        self.remove_by_key(&key)
    }

    /// Remove the value stored under `key`. Returns whether it was present.
    pub fn remove_by_key(&self, key: &K) -> bool {
        let _writer = self.writer.lock();
        let mut by_key = self.by_key.write();
        let Some(slot) = by_key.remove(key) else {
            return false;
        };
        if slot.prioritised {
            self.priority_order.write().remove(&slot.entry);
        }
        self.insertion_order.lock().retain(|k| k != key);
        true
    }

    /// Take `key` out of the priority order only; it stays retrievable by key.
    pub fn remove_priority_key(&self, key: &K) -> bool {
        let _writer = self.writer.lock();
        let mut by_key = self.by_key.write();
        match by_key.get_mut(key) {
            Some(slot) if slot.prioritised => {
                self.priority_order.write().remove(&slot.entry);
                slot.prioritised = false;
                true
            }
            _ => false,
        }
    }

    /// Put `key` back into the priority order after `remove_priority_key`.
    pub fn add_priority_key(&self, key: &K) -> bool {
        let _writer = self.writer.lock();
        let mut by_key = self.by_key.write();
        match by_key.get_mut(key) {
            Some(slot) if !slot.prioritised => {
                self.priority_order.write().insert(slot.entry.clone());
                slot.prioritised = true;
                true
            }
            _ => false,
        }
    }

    pub fn get_by_key(&self, key: &K) -> Option<V> {
        self.by_key.read().get(key).map(|slot| slot.value.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.by_key.read().contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.by_key.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.read().is_empty()
    }

    /// Values in insertion order, oldest first.
    pub fn values_in_insertion_order(&self) -> Vec<V> {
        let by_key = self.by_key.read();
        self.insertion_order
            .lock()
            .iter()
            .filter_map(|key| by_key.get(key).map(|slot| slot.value.clone()))
            .collect()
    }

    /// Iterate values by ascending priority key.
    ///
    /// The order is a snapshot taken now; values are looked up as the
    /// iterator advances, so entries removed in the meantime are skipped and
    /// entries added in the meantime are not seen. Call again to restart.
    pub fn stream_in_priority_order(&self) -> PriorityStream<'_, K, V, P> {
        let keys: Vec<K> = self
            .priority_order
            .read()
            .iter()
            .map(|entry| entry.key.clone())
            .collect();
        PriorityStream {
            store: self,
            keys: keys.into_iter(),
        }
    }

    /// Remove everything.
    pub fn clear(&self) {
        let _writer = self.writer.lock();
        let mut by_key = self.by_key.write();
        by_key.clear();
        self.priority_order.write().clear();
        self.insertion_order.lock().clear();
    }
}

/// Lazy priority-ordered iterator over a [`BoundedDualOrderedStore`].
pub struct PriorityStream<'a, K, V, P> {
    store: &'a BoundedDualOrderedStore<K, V, P>,
    keys: std::vec::IntoIter<K>,
}

impl<K, V, P> Iterator for PriorityStream<'_, K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: Ord + Clone,
{
    type Item = V;

    fn next(&mut self) -> Option<V> {
        for key in self.keys.by_ref() {
            let by_key = self.store.by_key.read();
            match by_key.get(&key) {
                Some(slot) if slot.prioritised => return Some(slot.value.clone()),
                _ => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: &'static str,
        priority: i32,
    }

    fn item(id: &'static str, priority: i32) -> Item {
        Item { id, priority }
    }

    fn store(max_size: usize) -> BoundedDualOrderedStore<&'static str, Item, Reverse<i32>> {
        BoundedDualOrderedStore::new(max_size, |i: &Item| i.id, |i: &Item| Reverse(i.priority))
    }

    fn ids(store: &BoundedDualOrderedStore<&'static str, Item, Reverse<i32>>) -> Vec<&'static str> {
        store.stream_in_priority_order().map(|i| i.id).collect()
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let s = store(10);
        s.add(item("a", 0));
        s.add(item("b", 5));
        s.add(item("c", 0));
        s.add(item("d", 5));
        assert_eq!(ids(&s), vec!["b", "d", "a", "c"]);
        // restartable
        assert_eq!(ids(&s), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_eviction_is_by_insertion_order() {
        let s = store(3);
        for (id, priority) in [("a", 9), ("b", 1), ("c", 5)] {
            assert_eq!(s.add(item(id, priority)), None);
        }
        assert_eq!(s.add(item("d", 0)), Some(item("a", 9)));
        assert_eq!(s.add(item("e", 0)), Some(item("b", 1)));

        assert_eq!(s.size(), 3);
        assert!(s.get_by_key(&"a").is_none());
        assert!(s.get_by_key(&"b").is_none());
        assert_eq!(ids(&s), vec!["c", "d", "e"]);
        let insertion: Vec<_> = s.values_in_insertion_order().into_iter().map(|i| i.id).collect();
        assert_eq!(insertion, vec!["c", "d", "e"]);
    }

    #[test]
    fn test_replace_keeps_insertion_position() {
        let s = store(2);
        s.add(item("a", 0));
        s.add(item("b", 0));
        assert_eq!(s.add(item("a", 10)), None);
        assert_eq!(ids(&s), vec!["a", "b"]);
        // "a" is still the oldest
        assert_eq!(s.add(item("c", 0)).map(|i| i.id), Some("a"));
    }

    #[test]
    fn test_remove() {
        let s = store(5);
        s.add(item("a", 0));
        s.add(item("b", 0));
        assert!(s.remove(&item("a", 123)));
        assert!(!s.remove_by_key(&"a"));
        assert!(s.remove_by_key(&"b"));
        assert!(s.is_empty());
        assert!(ids(&s).is_empty());
        assert!(s.values_in_insertion_order().is_empty());
    }

    #[test]
    fn test_priority_key_removal() {
        let s = store(5);
        s.add(item("a", 0));
        s.add(item("b", 0));
        assert!(s.remove_priority_key(&"a"));
        assert!(!s.remove_priority_key(&"a"));
        assert_eq!(ids(&s), vec!["b"]);
        assert!(s.get_by_key(&"a").is_some());
        assert_eq!(s.size(), 2);

        // replacing keeps it out of the priority order
        s.add(item("a", 3));
        assert_eq!(ids(&s), vec!["b"]);

        assert!(s.add_priority_key(&"a"));
        assert_eq!(ids(&s), vec!["a", "b"]);
    }

    #[test]
    fn test_removed_during_iteration_is_skipped() {
        let s = store(5);
        s.add(item("a", 2));
        s.add(item("b", 1));
        s.add(item("c", 0));
        let mut stream = s.stream_in_priority_order();
        assert_eq!(stream.next().map(|i| i.id), Some("a"));
        s.remove_by_key(&"b");
        s.add(item("z", 9));
        assert_eq!(stream.next().map(|i| i.id), Some("c"));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_disabled_store() {
        let s = store(0);
        assert!(s.is_disabled());
        assert_eq!(s.add(item("a", 0)), None);
        assert!(s.is_empty());
        assert!(s.get_by_key(&"a").is_none());
    }

    #[test]
    fn test_clear() {
        let s = store(5);
        s.add(item("a", 0));
        s.clear();
        assert_eq!(s.size(), 0);
        assert!(ids(&s).is_empty());
    }
}

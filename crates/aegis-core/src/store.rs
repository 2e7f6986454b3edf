//! Sharded concurrent keyed store
//!
//! Thin wrapper over `DashMap` used for every keyed collection in the core
//! (fatigue counters, correlation groups, cached predictions, experiment
//! phases). Values are cloned out so no shard guard escapes a call.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Keyed store with concurrent readers and sharded writers.
///
/// Clones share the same underlying map.
#[derive(Debug)]
pub struct ConcurrentStore<K, V>
where
    K: Eq + Hash,
{
    inner: Arc<DashMap<K, V>>,
}

impl<K, V> Clone for ConcurrentStore<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for ConcurrentStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Insert a value, returning the previous one
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, value)| value)
    }

    /// Remove an entry only if it still satisfies `pred`
    pub fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        self.inner.remove_if(key, |_, v| pred(v)).map(|(_, value)| value)
    }

    /// Mutate an existing entry in place
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.inner.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Mutate the entry for `key`, creating it with `init` first if absent
    pub fn upsert<R>(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut entry = self.inner.entry(key).or_insert_with(init);
        f(entry.value_mut())
    }

    /// Keep only entries for which `keep` returns true
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.inner.retain(|k, v| keep(k, v));
    }

    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Values matching a predicate
    pub fn filter_values(&self, mut pred: impl FnMut(&V) -> bool) -> Vec<V> {
        self.inner
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store: ConcurrentStore<String, u32> = ConcurrentStore::new();
        assert!(store.insert("a".into(), 1).is_none());
        assert_eq!(store.insert("a".into(), 2), Some(1));
        assert_eq!(store.get(&"a".to_string()), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_upsert_creates_then_mutates() {
        let store: ConcurrentStore<&'static str, u32> = ConcurrentStore::new();
        let first = store.upsert("k", || 0, |v| {
            *v += 1;
            *v
        });
        let second = store.upsert("k", || 0, |v| {
            *v += 1;
            *v
        });
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn test_update_missing_key() {
        let store: ConcurrentStore<u8, u8> = ConcurrentStore::new();
        assert!(store.update(&1, |v| *v += 1).is_none());
    }

    #[test]
    fn test_retain_and_clone_share_state() {
        let store: ConcurrentStore<u32, u32> = ConcurrentStore::new();
        for i in 0..10 {
            store.insert(i, i * 10);
        }
        let shared = store.clone();
        shared.retain(|k, _| k % 2 == 0);

        assert_eq!(store.len(), 5);
        assert_eq!(store.filter_values(|v| *v >= 50).len(), 3);
    }

    #[test]
    fn test_concurrent_writers() {
        let store: ConcurrentStore<u32, u64> = ConcurrentStore::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.upsert(0, || 0, |v| *v += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get(&0), Some(8000));
    }
}

//! Fingerprint-pinned caches shared across concurrent turns.
//!
//! Readers load the current map without locking; writers publish a new map
//! with `rcu`. An entry is served only while its fingerprint matches the
//! caller's, so a changed bundle is always re-derived.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Slot<V> {
    fingerprint: String,
    value: Arc<V>,
}

impl<V> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Self {
            fingerprint: self.fingerprint.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

pub struct FingerprintCache<V> {
    slots: ArcSwap<HashMap<String, Slot<V>>>,
}

impl<V> Default for FingerprintCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FingerprintCache<V> {
    pub fn new() -> Self {
        Self {
            slots: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Cached value for `key` if it was derived from `fingerprint`.
    pub fn get(&self, key: &str, fingerprint: &str) -> Option<Arc<V>> {
        let slots = self.slots.load();
        slots
            .get(key)
            .filter(|s| s.fingerprint == fingerprint)
            .map(|s| Arc::clone(&s.value))
    }

    /// Return the cached value or derive, publish and return a fresh one.
    ///
    /// A stale entry (different fingerprint) is replaced.
    pub fn get_or_insert_with<F>(&self, key: &str, fingerprint: &str, derive: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.get(key, fingerprint) {
            return hit;
        }
        let value = Arc::new(derive());
        let slot = Slot {
            fingerprint: fingerprint.to_string(),
            value: Arc::clone(&value),
        };
        self.slots.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(key.to_string(), slot.clone());
            next
        });
        tracing::debug!(key = %key, fingerprint = %fingerprint, "cache entry derived");
        value
    }

    pub fn invalidate(&self, key: &str) {
        self.slots.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(key);
            next
        });
    }

    /// Keep only the keys for which `keep` returns true.
    pub fn retain<F>(&self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        self.slots.rcu(|current| {
            current
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>()
        });
    }

    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_hit_on_same_fingerprint() {
        let cache = FingerprintCache::new();
        let calls = Cell::new(0);
        let derive = || {
            calls.set(calls.get() + 1);
            "v1".to_string()
        };
        let a = cache.get_or_insert_with("conv", "aaaa", derive);
        let b = cache.get_or_insert_with("conv", "aaaa", || unreachable!());
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_fingerprint_change_rederives() {
        let cache = FingerprintCache::new();
        cache.get_or_insert_with("conv", "aaaa", || 1u32);
        assert!(cache.get("conv", "bbbb").is_none());
        let fresh = cache.get_or_insert_with("conv", "bbbb", || 2u32);
        assert_eq!(*fresh, 2);
        assert!(cache.get("conv", "aaaa").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_retain_and_invalidate() {
        let cache = FingerprintCache::new();
        cache.get_or_insert_with("a", "1", || ());
        cache.get_or_insert_with("b", "1", || ());
        cache.retain(|k| k == "a");
        assert!(cache.get("b", "1").is_none());
        cache.invalidate("a");
        assert!(cache.is_empty());
    }
}

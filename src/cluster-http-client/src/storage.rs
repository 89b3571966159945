//! Per-replica, per-client mutable state.
//!
//! Each weight modifier owns exactly one namespace of state, typed to
//! whatever it needs (a health value, a leadership flag, ...). Rather than
//! a single heterogeneous map keyed by a string namespace, each modifier
//! gets its own typed [`ReplicaStorage<V>`] instance — there is no need for
//! a type-erased container when each namespace is statically owned by one
//! modifier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::replica::Replica;

/// Where a [`ReplicaStorage`] instance's lifetime is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplicaStorageScope {
    /// One instance shared by every request issued by a client, for the
    /// lifetime of the client.
    Process,
    /// A fresh instance created for each request and dropped with it.
    Request,
}

/// A concurrent `Replica -> V` map, mutated only through CAS-like
/// operations.
///
/// Backed by a single `parking_lot::RwLock`, which gives the map
/// linearizable access per key: a `try_add`/`try_update` observes and
/// mutates a value atomically, so a failed CAS reliably signals
/// contention, without requiring a lock-free data structure.
#[derive(Debug, Clone)]
pub struct ReplicaStorage<V> {
    inner: Arc<RwLock<HashMap<Replica, V>>>,
}

impl<V> Default for ReplicaStorage<V> {
    fn default() -> Self {
        ReplicaStorage {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<V: Clone> ReplicaStorage<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the current value for `replica`, if any.
    pub fn get(&self, replica: &Replica) -> Option<V> {
        self.inner.read().get(replica).cloned()
    }

    /// Inserts `value` for `replica` only if absent. Returns `true` if the
    /// insert happened.
    pub fn try_add(&self, replica: &Replica, value: V) -> bool {
        let mut guard = self.inner.write();
        if guard.contains_key(replica) {
            false
        } else {
            guard.insert(replica.clone(), value);
            true
        }
    }

    /// Replaces the value for `replica` with `new_value` only if the current
    /// value equals `expected_old` (by the caller-supplied comparator,
    /// since `V` need not implement `PartialEq`). Returns `true` on success;
    /// `false` signals contention, and the caller must re-read and retry.
    pub fn try_update<F>(&self, replica: &Replica, new_value: V, matches_expected: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let mut guard = self.inner.write();
        match guard.get(replica) {
            Some(current) if matches_expected(current) => {
                guard.insert(replica.clone(), new_value);
                true
            }
            _ => false,
        }
    }

    /// Reads the value for `replica`, installing `factory()`'s result if
    /// absent. `factory` may be invoked without its result being installed
    /// (if another thread wins the race), but exactly one produced value
    /// ends up stored.
    pub fn get_or_add(&self, replica: &Replica, factory: impl FnOnce() -> V) -> V {
        if let Some(existing) = self.get(replica) {
            return existing;
        }
        let mut guard = self.inner.write();
        guard
            .entry(replica.clone())
            .or_insert_with(factory)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_add_then_get() {
        let storage: ReplicaStorage<i32> = ReplicaStorage::new();
        let r = Replica::new("http://a");
        assert!(storage.try_add(&r, 1));
        assert!(!storage.try_add(&r, 2));
        assert_eq!(storage.get(&r), Some(1));
    }

    #[test]
    fn try_update_detects_contention() {
        let storage: ReplicaStorage<i32> = ReplicaStorage::new();
        let r = Replica::new("http://a");
        storage.try_add(&r, 1);
        assert!(storage.try_update(&r, 2, |v| *v == 1));
        // Stale expectation now fails: this is the contention signal.
        assert!(!storage.try_update(&r, 3, |v| *v == 1));
        assert_eq!(storage.get(&r), Some(2));
    }

    #[test]
    fn get_or_add_installs_exactly_once() {
        let storage: ReplicaStorage<i32> = ReplicaStorage::new();
        let r = Replica::new("http://a");
        assert_eq!(storage.get_or_add(&r, || 42), 42);
        assert_eq!(storage.get_or_add(&r, || 99), 42);
    }
}

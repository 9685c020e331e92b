//! Per-key mutual exclusion.
//!
//! Work for the same key runs one at a time; work for different keys runs
//! in parallel. Slots are created on first use and dropped once nobody holds
//! or waits on them, so the map only tracks keys with work in flight.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A set of mutexes addressed by key.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let slot = Arc::clone(self.slots().entry(key.clone()).or_default());

        let result = {
            // The slot guards no data, so a panic elsewhere leaves nothing
            // inconsistent behind.
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only taken under the map lock, so a lone map reference
        // means nobody holds or waits on the slot.
        drop(slot);
        let mut slots = self.slots();
        if slots.get(key).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(key);
        }
        result
    }

    /// Number of keys with work in flight.
    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<K, Arc<Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

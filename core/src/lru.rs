//! # LRU Tracker
//!
//! Least-recently-used ordering over a set of keys. Used by buffer pools
//! to pick eviction victims when an allocation does not fit.

use alloc::collections::BTreeMap;
use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;

/// Recency ordering of distinct values
///
/// `push` marks a value most recently used, `pop` hands back the least
/// recently used one. Both are O(log n).
pub struct Lru<T> {
    /// Value -> stamp of its last push
    stamps: HashMap<T, u64>,
    /// Stamp -> value, oldest first
    order: BTreeMap<u64, T>,
    /// Next stamp
    clock: u64,
}

impl<T: Eq + Hash + Clone> Lru<T> {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            stamps: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Mark `value` as most recently used, inserting it if absent
    pub fn push(&mut self, value: T) {
        let stamp = self.clock;
        self.clock += 1;

        if let Some(old) = self.stamps.insert(value.clone(), stamp) {
            self.order.remove(&old);
        }
        self.order.insert(stamp, value);
    }

    /// Remove and return the least recently used value
    pub fn pop(&mut self) -> Option<T> {
        let (_, value) = self.order.pop_first()?;
        self.stamps.remove(&value);
        Some(value)
    }

    /// Peek at the least recently used value
    pub fn peek(&self) -> Option<&T> {
        self.order.values().next()
    }

    /// Forget `value`; returns whether it was tracked
    pub fn remove(&mut self, value: &T) -> bool {
        match self.stamps.remove(value) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            },
            None => false,
        }
    }

    /// Check whether `value` is tracked
    pub fn contains(&self, value: &T) -> bool {
        self.stamps.contains_key(value)
    }

    /// Number of tracked values
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every tracked value
    pub fn clear(&mut self) {
        self.stamps.clear();
        self.order.clear();
    }
}

impl<T: Eq + Hash + Clone> Default for Lru<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lru<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Oldest first
        f.debug_list().entries(self.order.values()).finish()
    }
}

//! Open events waiting for their matching close.

use indexmap::IndexMap;

use std::hash::Hash;

/// Per-pass table of open events keyed by device, function or cpu.
///
/// A second open for a key that is still pending replaces the first one
/// (last open wins); the replaced open is counted in `overwritten`.
#[derive(Debug, Clone)]
pub struct PendingTable<K, V = f64> {
    entries: IndexMap<K, V>,
    overwritten: usize,
}

impl<K: Hash + Eq, V> Default for PendingTable<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            overwritten: 0,
        }
    }
}

impl<K: Hash + Eq, V> PendingTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, key: K, value: V) {
        if self.entries.insert(key, value).is_some() {
            self.overwritten += 1;
        }
    }

    /// Removes and returns the pending open for `key`, if any.
    pub fn close(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn overwritten(&self) -> usize {
        self.overwritten
    }
}

//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// In-memory ordered table
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock), returning the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut data = self.data.write();
        let key_len = key.len();
        let value_len = value.len();
        match data.insert(key, value) {
            // Key bytes were already counted
            Some(old) => {
                self.size.fetch_add(value_len, Ordering::Relaxed);
                self.size.fetch_sub(old.len(), Ordering::Relaxed);
            }
            None => {
                self.size.fetch_add(key_len + value_len, Ordering::Relaxed);
            }
        }
        self.size.load(Ordering::Relaxed)
    }

    /// Remove a key (write lock), returning whether it existed
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut data = self.data.write();
        match data.remove(key) {
            Some(old) => {
                self.size.fetch_sub(key.len() + old.len(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// First entry whose key falls after `from`
    pub fn seek(&self, from: Bound<&[u8]>) -> Option<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .range::<[u8], _>((from, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Copy of all entries in key order
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

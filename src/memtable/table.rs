//! MemTable implementation
//!
//! BTreeMap-based table owned by a single worker thread.

use std::collections::BTreeMap;
use std::ops::Bound;

/// In-memory table for one database
#[derive(Debug, Default, Clone)]
pub struct MemTable {
    data: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Approximate size in bytes (keys + values)
    size: usize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from existing entries (snapshot load)
    pub fn from_entries(entries: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>) -> Self {
        let mut table = Self::new();
        for (key, value) in entries {
            table.put(key, value);
        }
        table
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key).map(|v| v.as_slice())
    }

    /// Insert or overwrite, returning the new table size
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let key_len = key.len();
        let value_len = value.len();
        match self.data.insert(key, value) {
            Some(old) => self.size = self.size - old.len() + value_len,
            None => self.size += key_len + value_len,
        }
        self.size
    }

    /// Remove a key, returning whether it existed
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.data.remove(key) {
            Some(old) => {
                self.size -= key.len() + old.len();
                true
            }
            None => false,
        }
    }

    /// Entries with `start <= key <= end`, in key order
    pub fn range(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        if start > end {
            return Vec::new();
        }
        self.data
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.data.iter()
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

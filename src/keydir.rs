//! The in-memory key directory (spec §4.4): a mapping from each live key to
//! the exact byte location of its most recent record.

use std::collections::HashMap;

/// Where a key's current record lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub fid: u64,
    pub offset: i64,
    pub key_size: u32,
    pub value_size: u32,
    pub timestamp: u64,
}

/// Maps live keys (raw byte equality) to their [`DirEntry`].
#[derive(Debug, Default)]
pub struct KeyDir {
    entries: HashMap<Vec<u8>, DirEntry>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<DirEntry> {
        self.entries.get(key).copied()
    }

    /// Installs or overwrites the entry for `key`.
    pub fn put(&mut self, key: Vec<u8>, entry: DirEntry) {
        self.entries.insert(key, entry);
    }

    /// Removes the entry for `key`, if any, returning it.
    pub fn delete(&mut self, key: &[u8]) -> Option<DirEntry> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

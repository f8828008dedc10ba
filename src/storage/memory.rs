// src/storage/memory.rs

// In-memory cache for tests and deployments without a cache directory
use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::{CacheEntry, CacheStore};

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    /// Keys from oldest to newest write
    order: VecDeque<String>,
}

/// Bounded in-memory cache; the oldest write is evicted first
#[derive(Debug)]
pub struct MemoryCache {
    max_entries: usize,
    data: RwLock<MemoryState>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            data: RwLock::new(MemoryState {
                entries: HashMap::with_capacity(max_entries.min(10_000)),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl CacheStore for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.data.read().entries.get(key).cloned())
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let mut data = self.data.write();

        if data.entries.insert(entry.key.clone(), entry.clone()).is_some() {
            // Rewritten keys move to the newest position
            data.order.retain(|k| k != &entry.key);
        }
        data.order.push_back(entry.key.clone());

        while data.entries.len() > self.max_entries {
            match data.order.pop_front() {
                Some(oldest) => {
                    data.entries.remove(&oldest);
                }
                None => break,
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut data = self.data.write();
        let removed = data.entries.remove(key).is_some();
        if removed {
            data.order.retain(|k| k != key);
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<usize> {
        let mut data = self.data.write();
        let removed = data.entries.len();
        data.entries.clear();
        data.order.clear();
        Ok(removed)
    }
}

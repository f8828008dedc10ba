// src/storage/mod.rs

pub mod disk;
pub mod memory;

#[cfg(test)]
mod tests;

pub use disk::DiskCache;
pub use memory::MemoryCache;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// One cached response body with its write timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub written_at: DateTime<Utc>,
    /// Raw response body exactly as received
    pub payload: String,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            written_at: Utc::now(),
            payload: payload.into(),
        }
    }

    /// Age of the entry; a timestamp from the future counts as zero
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.written_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }
}

/// Core trait that all response caches implement
///
/// Stores never expire entries on their own; freshness is decided by the
/// reader through [`CacheStore::get_fresh`].
pub trait CacheStore: Send + Sync + Debug {
    // Loads an entry regardless of its age
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    // Writes an entry, replacing any previous one for the same key
    fn store(&self, entry: &CacheEntry) -> Result<()>;

    // Deletes one entry
    fn remove(&self, key: &str) -> Result<bool>;

    // Deletes every entry, returning how many were removed
    fn clear(&self) -> Result<usize>;

    /// Entry younger than `max_age`; stale entries are a miss and stay in place
    fn get_fresh(&self, key: &str, max_age: Duration) -> Result<Option<CacheEntry>> {
        Ok(self.load(key)?.filter(|entry| entry.is_fresh(max_age)))
    }
}

/// Deterministic key for `(endpoint, params)`
///
/// Parameters arrive sorted from the `BTreeMap`, so insertion order never
/// changes the key. The readable endpoint prefix keeps cache directories
/// browsable.
pub fn cache_key(endpoint: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    for (name, value) in params {
        hasher.update(b"\x1f");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    let digest = hasher.finalize();

    let prefix: String = endpoint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let prefix = prefix.trim_matches('_');
    if prefix.is_empty() {
        format!("{:x}", digest)
    } else {
        format!("{}_{:x}", prefix, digest)
    }
}

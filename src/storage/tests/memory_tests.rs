// src/storage/tests/memory_tests.rs

use super::common;
use crate::storage::{CacheEntry, CacheStore, MemoryCache};

#[test]
fn test_memory_shared_behaviour() {
    common::test_round_trip_is_byte_identical(&MemoryCache::default()).unwrap();
    common::test_stale_entry_is_a_miss_but_kept(&MemoryCache::default()).unwrap();
    common::test_overwrite_refreshes_entry(&MemoryCache::default()).unwrap();
    common::test_remove_and_clear(&MemoryCache::default()).unwrap();
}

#[test]
fn test_oldest_entry_is_evicted_at_capacity() {
    let cache = MemoryCache::new(2);
    cache.store(&CacheEntry::new("first", "1")).unwrap();
    cache.store(&CacheEntry::new("second", "2")).unwrap();
    cache.store(&CacheEntry::new("third", "3")).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.load("first").unwrap().is_none());
    assert!(cache.load("third").unwrap().is_some());
}

#[test]
fn test_rewrite_moves_key_to_newest() {
    let cache = MemoryCache::new(2);
    cache.store(&CacheEntry::new("first", "1")).unwrap();
    cache.store(&CacheEntry::new("second", "2")).unwrap();
    cache.store(&CacheEntry::new("first", "1b")).unwrap();
    cache.store(&CacheEntry::new("third", "3")).unwrap();

    assert!(cache.load("second").unwrap().is_none());
    assert_eq!(cache.load("first").unwrap().unwrap().payload, "1b");
}

#[test]
fn test_zero_capacity_still_holds_one_entry() {
    let cache = MemoryCache::new(0);
    assert_eq!(cache.max_entries(), 1);
    cache.store(&CacheEntry::new("only", "x")).unwrap();
    assert!(!cache.is_empty());
}

// src/storage/tests/mod.rs

mod memory_tests;

// Behaviour every cache store must share
pub(crate) mod common {
    use std::time::Duration;

    use chrono::Utc;

    use crate::error::Result;
    use crate::storage::{CacheEntry, CacheStore};

    pub fn test_round_trip_is_byte_identical<S: CacheStore>(store: &S) -> Result<()> {
        // Whitespace and key order must survive untouched
        let body = "{\"type\": \"FeatureCollection\",\n  \"features\": [],\"metadata\":{\"count\":0}}";
        store.store(&CacheEntry::new("query_abc", body))?;

        let entry = store.get_fresh("query_abc", Duration::from_secs(300))?;
        assert_eq!(entry.map(|e| e.payload).as_deref(), Some(body));
        Ok(())
    }

    pub fn test_stale_entry_is_a_miss_but_kept<S: CacheStore>(store: &S) -> Result<()> {
        let mut entry = CacheEntry::new("stale", "{}");
        entry.written_at = Utc::now() - chrono::Duration::minutes(6);
        store.store(&entry)?;

        assert!(store.get_fresh("stale", Duration::from_secs(300))?.is_none());
        // Expired entries are not deleted eagerly
        assert_eq!(store.load("stale")?, Some(entry));
        Ok(())
    }

    pub fn test_overwrite_refreshes_entry<S: CacheStore>(store: &S) -> Result<()> {
        let mut old = CacheEntry::new("refresh", "old");
        old.written_at = Utc::now() - chrono::Duration::hours(1);
        store.store(&old)?;
        store.store(&CacheEntry::new("refresh", "new"))?;

        let entry = store.get_fresh("refresh", Duration::from_secs(60))?;
        assert_eq!(entry.map(|e| e.payload).as_deref(), Some("new"));
        Ok(())
    }

    pub fn test_remove_and_clear<S: CacheStore>(store: &S) -> Result<()> {
        store.store(&CacheEntry::new("a", "1"))?;
        store.store(&CacheEntry::new("b", "2"))?;

        assert!(store.remove("a")?);
        assert!(!store.remove("a")?);
        assert!(store.load("a")?.is_none());

        store.store(&CacheEntry::new("c", "3"))?;
        assert!(store.clear()? >= 2);
        assert!(store.load("b")?.is_none());
        assert!(store.load("c")?.is_none());
        Ok(())
    }
}

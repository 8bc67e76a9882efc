//! Process-local cache backend.
//!
//! Suitable for single-process deployments and tests. Multi-process
//! deployments plug a shared store in through [`CacheBackend`].

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;

use super::backend::CacheBackend;
use super::error::BackendError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memory";

/// In-memory LRU backend holding raw serialized representations.
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, String>>,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            entries: RwLock::new(LruCache::unbounded()),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Read a value without touching its recency.
    pub fn peek(&self, key: &str) -> Option<String> {
        rw_read(&self.entries, SOURCE, "peek").peek(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of values written since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of deletes issued since construction, hit or not.
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(rw_write(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get_many");
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BackendError> {
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn set_many(&self, entries: HashMap<String, String>) -> Result<(), BackendError> {
        let count = entries.len() as u64;
        let mut cache = rw_write(&self.entries, SOURCE, "set_many");
        for (key, value) in entries {
            cache.put(key, value);
        }
        self.writes.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let backend = MemoryBackend::default();
        assert!(backend.is_enabled());

        backend.set("a", "1".to_string()).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(backend.write_count(), 1);

        backend.delete("a").await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), None);
        assert_eq!(backend.delete_count(), 1);
    }

    #[tokio::test]
    async fn get_many_omits_missing_keys() {
        let backend = MemoryBackend::default();
        backend
            .set_many(HashMap::from([
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]))
            .await
            .unwrap();

        let found = backend
            .get_many(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"], "1");
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn lru_eviction_at_capacity() {
        let backend = MemoryBackend::new(NonZeroUsize::MIN);
        backend.set("a", "1".to_string()).await.unwrap();
        backend.set("b", "2".to_string()).await.unwrap();

        assert!(!backend.contains("a"));
        assert_eq!(backend.peek("b").as_deref(), Some("2"));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let backend = MemoryBackend::default();
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = backend
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        backend.set("a", "1".to_string()).await.unwrap();
        assert_eq!(backend.peek("a").as_deref(), Some("1"));
    }
}

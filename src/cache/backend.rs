//! Shared cache backend interface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::config::CacheConfig;
use super::error::BackendError;
use super::memory::MemoryBackend;

/// A key/value store shared by every process serving the cache.
///
/// Implementations must replace whole values on `set`; the engine relies
/// on entries never being partially written.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `false` for the disabled sentinel, which turns every read into a
    /// miss and every write into a no-op without touching any store.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, BackendError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BackendError>;

    async fn set_many(&self, entries: HashMap<String, String>) -> Result<(), BackendError> {
        for (key, value) in entries {
            self.set(&key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

/// The "no cache" backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
        Ok(None)
    }

    async fn get_many(&self, _keys: &[String]) -> Result<HashMap<String, String>, BackendError> {
        Ok(HashMap::new())
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), BackendError> {
        Ok(())
    }

    async fn set_many(&self, _entries: HashMap<String, String>) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

/// The in-process LRU backend, or the "no cache" backend when disabled.
pub fn backend_from_config(config: &CacheConfig) -> Arc<dyn CacheBackend> {
    if config.enabled {
        Arc::new(MemoryBackend::new(config.memory_capacity_non_zero()))
    } else {
        Arc::new(NullBackend)
    }
}

pub fn backend_from_settings(settings: &crate::config::CacheSettings) -> Arc<dyn CacheBackend> {
    backend_from_config(&CacheConfig::from(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_follows_enabled_flag() {
        assert!(backend_from_config(&CacheConfig::default()).is_enabled());
        assert!(!backend_from_config(&CacheConfig::disabled()).is_enabled());
    }

    #[tokio::test]
    async fn null_backend_never_retains_values() {
        let backend = NullBackend;
        assert!(!backend.is_enabled());

        backend.set("key", "value".to_string()).await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), None);
        assert!(
            backend
                .get_many(&["key".to_string()])
                .await
                .unwrap()
                .is_empty()
        );
        backend.delete("key").await.unwrap();
    }
}

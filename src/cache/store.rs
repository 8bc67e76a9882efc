//! Representation store.
//!
//! Owns cache key formatting and every call into the shared backend.
//! Backend failures are absorbed here: reads degrade to misses and writes
//! to no-ops, so callers only ever see the data store as authoritative.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::{PrimaryKey, Representation};

use super::backend::CacheBackend;
use super::error::BackendError;
use super::keys::Keyspace;

const METRIC_WRITE_TOTAL: &str = "instcache_write_total";
const METRIC_BACKEND_ERROR_TOTAL: &str = "instcache_backend_error_total";

/// Versioned, keyed access to cached representations.
#[derive(Clone)]
pub struct RepresentationStore {
    backend: Arc<dyn CacheBackend>,
    keyspace: Keyspace,
    versions: Vec<String>,
}

impl RepresentationStore {
    pub fn new(backend: Arc<dyn CacheBackend>, keyspace: Keyspace, versions: Vec<String>) -> Self {
        Self {
            backend,
            keyspace,
            versions,
        }
    }

    pub fn key_for(&self, version: &str, type_name: &str, key: &PrimaryKey) -> String {
        self.keyspace.key_for(version, type_name, key)
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(err) => {
                degraded(&err, key);
                None
            }
        }
    }

    /// Fetch every key in one backend call. Absent keys are missing from the result.
    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, String> {
        if keys.is_empty() || !self.is_enabled() {
            return HashMap::new();
        }
        match self.backend.get_many(keys).await {
            Ok(values) => values,
            Err(err) => {
                degraded(&err, &format!("{} keys", keys.len()));
                HashMap::new()
            }
        }
    }

    pub async fn set(&self, key: &str, value: String) {
        if !self.is_enabled() {
            return;
        }
        match self.backend.set(key, value).await {
            Ok(()) => counter!(METRIC_WRITE_TOTAL).increment(1),
            Err(err) => degraded(&err, key),
        }
    }

    pub async fn set_many(&self, entries: HashMap<String, String>) {
        if entries.is_empty() || !self.is_enabled() {
            return;
        }
        let count = entries.len() as u64;
        match self.backend.set_many(entries).await {
            Ok(()) => counter!(METRIC_WRITE_TOTAL).increment(count),
            Err(err) => degraded(&err, &format!("{count} entries")),
        }
    }

    pub async fn delete(&self, key: &str) {
        if !self.is_enabled() {
            return;
        }
        if let Err(err) = self.backend.delete(key).await {
            degraded(&err, key);
        }
    }

    /// Delete the entry for every configured version, whether present or not.
    pub async fn delete_all_versions(&self, type_name: &str, key: &PrimaryKey) {
        if !self.is_enabled() {
            debug!(type_name, %key, "Skipping delete_all_versions: cache disabled");
            return;
        }
        for version in &self.versions {
            let cache_key = self.key_for(version, type_name, key);
            self.delete(&cache_key).await;
        }
    }

    /// Read and parse the representation stored under `key`.
    ///
    /// Anything other than a JSON object counts as a miss.
    pub async fn get_representation(&self, key: &str) -> Option<Representation> {
        let raw = self.get(key).await?;
        parse_representation(key, &raw)
    }
}

/// Parse a raw cache value, treating corrupt entries and empty objects as misses.
pub(crate) fn parse_representation(key: &str, raw: &str) -> Option<Representation> {
    match serde_json::from_str::<Representation>(raw) {
        Ok(representation) if representation.is_empty() => None,
        Ok(representation) => Some(representation),
        Err(err) => {
            warn!(
                cache_key = key,
                error = %err,
                "Ignoring corrupt cache entry"
            );
            None
        }
    }
}

fn degraded(err: &BackendError, subject: &str) {
    counter!(METRIC_BACKEND_ERROR_TOTAL, "operation" => err.operation).increment(1);
    warn!(
        operation = err.operation,
        subject,
        error = %err,
        "Cache backend unavailable; continuing without cache"
    );
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cache::backend::NullBackend;
    use crate::cache::memory::MemoryBackend;

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
            Err(BackendError::new("get", "connection refused"))
        }

        async fn get_many(
            &self,
            _keys: &[String],
        ) -> Result<HashMap<String, String>, BackendError> {
            Err(BackendError::new("get_many", "connection refused"))
        }

        async fn set(&self, _key: &str, _value: String) -> Result<(), BackendError> {
            Err(BackendError::new("set", "connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<(), BackendError> {
            Err(BackendError::new("delete", "connection refused"))
        }
    }

    fn store_with(backend: Arc<dyn CacheBackend>) -> RepresentationStore {
        RepresentationStore::new(
            backend,
            Keyspace::default(),
            vec!["default".to_string(), "v2".to_string()],
        )
    }

    #[tokio::test]
    async fn delete_all_versions_removes_each_version() {
        let backend = Arc::new(MemoryBackend::default());
        let store = store_with(backend.clone());
        let key = PrimaryKey::Int(1);

        store.set("drfc_default_User_1", "{}".to_string()).await;
        store.set("drfc_v2_User_1", "{}".to_string()).await;
        store.delete_all_versions("User", &key).await;

        assert!(backend.is_empty());
        assert_eq!(backend.delete_count(), 2);

        // Idempotent on absent entries.
        store.delete_all_versions("User", &key).await;
        assert_eq!(backend.delete_count(), 4);
    }

    #[tokio::test]
    async fn backend_failures_degrade_to_misses() {
        let store = store_with(Arc::new(FailingBackend));

        assert_eq!(store.get("k").await, None);
        assert!(store.get_many(&["k".to_string()]).await.is_empty());
        store.set("k", "{}".to_string()).await;
        store
            .set_many(HashMap::from([("k".to_string(), "{}".to_string())]))
            .await;
        store.delete("k").await;
        store.delete_all_versions("User", &PrimaryKey::Int(1)).await;
    }

    #[tokio::test]
    async fn disabled_backend_is_never_called() {
        let store = store_with(Arc::new(NullBackend));
        assert!(!store.is_enabled());
        store.set("k", "{\"id\": 1}".to_string()).await;
        assert_eq!(store.get_representation("k").await, None);
    }

    #[tokio::test]
    async fn corrupt_and_empty_entries_are_misses() {
        let backend = Arc::new(MemoryBackend::default());
        let store = store_with(backend);

        store.set("corrupt", "not json".to_string()).await;
        store.set("array", "[1, 2]".to_string()).await;
        store.set("empty", "{}".to_string()).await;
        store.set("valid", "{\"id\": 1}".to_string()).await;

        assert_eq!(store.get_representation("corrupt").await, None);
        assert_eq!(store.get_representation("array").await, None);
        assert_eq!(store.get_representation("empty").await, None);
        let valid = store.get_representation("valid").await.unwrap();
        assert_eq!(valid["id"], 1);
    }
}

//! The instance cache facade.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{PrimaryKey, Representation};

use super::backend::{CacheBackend, NullBackend, backend_from_config};
use super::codec::FieldCodecs;
use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::Keyspace;
use super::registry::{Loader, Registry, Serializer};
use super::store::RepresentationStore;

/// Read-through, write-invalidated cache of record representations.
///
/// Holds no per-call state; share it behind an `Arc`.
pub struct InstanceCache<R> {
    pub(super) store: RepresentationStore,
    pub(super) registry: Arc<Registry<R>>,
    pub(super) codecs: FieldCodecs,
    pub(super) default_version: String,
}

impl<R> InstanceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Build an engine over `backend`. A disabled config swaps in the
    /// "no cache" backend regardless of what was passed.
    pub fn new(
        config: &CacheConfig,
        backend: Arc<dyn CacheBackend>,
        registry: Registry<R>,
        codecs: FieldCodecs,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        for version in registry.registered_versions() {
            if !config.versions.iter().any(|configured| configured == version) {
                warn!(
                    version,
                    "Registration targets a cache version that is not configured"
                );
            }
        }

        let backend: Arc<dyn CacheBackend> = if config.enabled {
            backend
        } else {
            Arc::new(NullBackend)
        };

        info!(
            enabled = backend.is_enabled(),
            versions = ?config.versions,
            default_version = %config.default_version,
            registrations = registry.len(),
            "Instance cache initialized"
        );

        Ok(Self {
            store: RepresentationStore::new(
                backend,
                Keyspace::new(config.key_prefix.clone()),
                config.versions.clone(),
            ),
            registry: Arc::new(registry),
            codecs,
            default_version: config.default_version.clone(),
        })
    }

    /// Build an engine with the backend the config selects.
    pub fn from_config(
        config: &CacheConfig,
        registry: Registry<R>,
        codecs: FieldCodecs,
    ) -> Result<Self, CacheError> {
        Self::new(config, backend_from_config(config), registry, codecs)
    }

    pub fn versions(&self) -> &[String] {
        self.store.versions()
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    pub fn codecs(&self) -> &FieldCodecs {
        &self.codecs
    }

    pub fn registry(&self) -> &Registry<R> {
        &self.registry
    }

    pub fn key_for(&self, version: &str, type_name: &str, key: &PrimaryKey) -> String {
        self.store.key_for(version, type_name, key)
    }

    /// Drop every version of one cached instance. Does nothing when disabled.
    pub async fn delete_all_versions(&self, type_name: &str, key: &PrimaryKey) {
        self.store.delete_all_versions(type_name, key).await;
    }

    pub(super) async fn load_with(
        &self,
        loader: &dyn Loader<R>,
        type_name: &str,
        key: &PrimaryKey,
    ) -> Result<Option<R>, CacheError> {
        loader
            .load(key)
            .await
            .map_err(|source| CacheError::Load {
                type_name: type_name.to_string(),
                key: key.clone(),
                source,
            })
    }

    /// Run a serializer, folding an empty representation into `None`.
    pub(super) fn serialize_with(
        &self,
        serializer: &dyn Serializer<R>,
        record: Option<&R>,
    ) -> Result<Option<Representation>, CacheError> {
        Ok(serializer
            .serialize(record, &self.codecs)?
            .filter(|representation| !representation.is_empty()))
    }
}

pub(super) fn encode_representation(
    cache_key: &str,
    representation: &Representation,
) -> Result<String, CacheError> {
    serde_json::to_string(representation).map_err(|source| CacheError::Encode {
        cache_key: cache_key.to_string(),
        source,
    })
}

impl<R> fmt::Debug for InstanceCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("versions", &self.store.versions())
            .field("default_version", &self.default_version)
            .field("enabled", &self.store.is_enabled())
            .field("registry", &self.registry)
            .finish()
    }
}

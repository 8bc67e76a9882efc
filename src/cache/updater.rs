//! Write path: refresh one instance and report its dependents.

use metrics::counter;
use tracing::{debug, instrument};

use crate::domain::{CascadeTarget, PrimaryKey};

use super::error::CacheError;
use super::instance::{InstanceCache, encode_representation};
use super::registry::Invalidation;
use super::store::parse_representation;

const METRIC_INVALIDATE_TOTAL: &str = "instcache_invalidate_total";

/// What the caller knows about the record behind an update.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState<R> {
    /// Load it with the registered loader.
    Unknown,
    /// The current record.
    Present(R),
    /// The row is gone; this is its last-known content.
    Deleted(R),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Restrict the update to one version instead of every configured one.
    pub version: Option<String>,
    /// Only refresh entries that are already cached.
    pub update_only: bool,
}

impl UpdateOptions {
    pub fn for_version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            update_only: false,
        }
    }

    pub fn update_only(mut self) -> Self {
        self.update_only = true;
        self
    }
}

impl<R> InstanceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Recompute the cached representation of one instance.
    ///
    /// Returns every `(type, key, version)` the invalidator asked to be
    /// refreshed. Scheduling those is the caller's job; nothing here recurses.
    #[instrument(
        skip(self, key, state, options),
        fields(key = %key, update_only = options.update_only)
    )]
    pub async fn update_instance(
        &self,
        type_name: &str,
        key: &PrimaryKey,
        state: RecordState<R>,
        options: &UpdateOptions,
    ) -> Result<Vec<CascadeTarget>, CacheError> {
        let versions: Vec<String> = match &options.version {
            Some(version) => vec![version.clone()],
            None => self.store.versions().to_vec(),
        };

        let (mut record, known_deleted) = match state {
            RecordState::Unknown => (None, false),
            RecordState::Present(record) => (Some(record), false),
            RecordState::Deleted(record) => (Some(record), true),
        };

        let mut cascades = Vec::new();
        for version in &versions {
            let registration = self.registry.lookup(type_name, version)?;
            if registration.is_unmanaged() {
                debug!(version = %version, "Skipping update: unmanaged version");
                continue;
            }
            if !self.store.is_enabled() {
                debug!(version = %version, "Skipping update: cache disabled");
                continue;
            }

            if record.is_none() {
                let loader = registration
                    .get_loader()
                    .ok_or_else(|| CacheError::loader_not_found(type_name, version))?;
                record = self.load_with(loader, type_name, key).await?;
            }
            let deleted = known_deleted || record.is_none();

            let invalidate = match registration.get_serializer() {
                Some(serializer) => {
                    let cache_key = self.store.key_for(version, type_name, key);
                    let current_raw = self.store.get(&cache_key).await;
                    let current = current_raw
                        .as_deref()
                        .and_then(|raw| parse_representation(&cache_key, raw));

                    let fresh = if options.update_only && current_raw.is_none() {
                        None
                    } else if deleted {
                        self.serialize_with(serializer, None)?
                    } else {
                        self.serialize_with(serializer, record.as_ref())?
                    };

                    let changed = deleted || current != fresh;
                    if changed {
                        match fresh.as_ref().filter(|_| !deleted) {
                            Some(fresh) => {
                                let raw = encode_representation(&cache_key, fresh)?;
                                self.store.set(&cache_key, raw).await;
                            }
                            None => self.store.delete(&cache_key).await,
                        }
                    } else {
                        debug!(cache_key = %cache_key, "Representation unchanged");
                    }
                    changed
                }
                None => true,
            };

            if !invalidate {
                continue;
            }
            counter!(METRIC_INVALIDATE_TOTAL).increment(1);

            let (Some(record), Some(invalidator)) =
                (record.as_ref(), registration.get_invalidator())
            else {
                continue;
            };

            let invalidations = invalidator.invalidate(record).await.map_err(|source| {
                CacheError::Invalidate {
                    type_name: type_name.to_string(),
                    key: key.clone(),
                    source,
                }
            })?;

            for invalidation in invalidations {
                match invalidation {
                    Invalidation::CacheKey(cache_key) => {
                        self.store.delete(&cache_key).await;
                    }
                    Invalidation::Instance {
                        type_name: dependent,
                        key: dependent_key,
                        immediate,
                    } => {
                        if immediate {
                            let cache_key = self.store.key_for(version, &dependent, &dependent_key);
                            self.store.delete(&cache_key).await;
                        }
                        cascades.push(CascadeTarget::new(
                            dependent,
                            dependent_key,
                            version.as_str(),
                        ));
                    }
                }
            }
        }

        debug!(cascades = cascades.len(), "Instance updated");
        Ok(cascades)
    }
}

//! Bulk read path.

use std::collections::HashMap;

use metrics::counter;
use tracing::{debug, instrument};

use crate::domain::{DecodedRepresentation, InstanceId, PrimaryKey, Representation};

use super::error::CacheError;
use super::instance::{InstanceCache, encode_representation};
use super::store::parse_representation;

const METRIC_HIT_TOTAL: &str = "instcache_hit_total";
const METRIC_MISS_TOTAL: &str = "instcache_miss_total";

/// One instance to resolve, optionally with its record already loaded.
#[derive(Debug, Clone)]
pub struct InstanceRequest<R> {
    pub type_name: String,
    pub key: PrimaryKey,
    pub record: Option<R>,
}

impl<R> InstanceRequest<R> {
    pub fn new(type_name: impl Into<String>, key: impl Into<PrimaryKey>) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            record: None,
        }
    }

    pub fn with_record(
        type_name: impl Into<String>,
        key: impl Into<PrimaryKey>,
        record: R,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            record: Some(record),
        }
    }
}

/// A resolved instance.
///
/// `record` is the caller's record or one loaded during the call; it is
/// `None` on a cache hit where the caller supplied nothing.
#[derive(Debug, Clone)]
pub struct ResolvedInstance<R> {
    pub representation: DecodedRepresentation,
    pub cache_key: String,
    pub record: Option<R>,
}

struct Pending<R> {
    id: InstanceId,
    cache_key: String,
    record: Option<R>,
}

impl<R> InstanceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Resolve decoded representations for a batch of instances.
    ///
    /// Performs one bulk cache read and at most one bulk cache write.
    /// Instances without a representation are absent from the result.
    #[instrument(skip_all, fields(requests = requests.len(), version))]
    pub async fn get_instances(
        &self,
        requests: Vec<InstanceRequest<R>>,
        version: Option<&str>,
    ) -> Result<HashMap<InstanceId, ResolvedInstance<R>>, CacheError> {
        let version = version.unwrap_or(self.default_version.as_str());
        tracing::Span::current().record("version", version);

        let mut pending: Vec<Pending<R>> = Vec::with_capacity(requests.len());
        let mut positions: HashMap<InstanceId, usize> = HashMap::with_capacity(requests.len());
        for request in requests {
            let id = InstanceId::new(request.type_name, request.key);
            match positions.get(&id) {
                Some(&position) => {
                    let entry = &mut pending[position];
                    if entry.record.is_none() {
                        entry.record = request.record;
                    }
                }
                None => {
                    let cache_key = self.store.key_for(version, &id.type_name, &id.key);
                    positions.insert(id.clone(), pending.len());
                    pending.push(Pending {
                        id,
                        cache_key,
                        record: request.record,
                    });
                }
            }
        }

        let cache_keys: Vec<String> = pending.iter().map(|p| p.cache_key.clone()).collect();
        let cached = self.store.get_many(&cache_keys).await;

        let mut to_set = HashMap::new();
        let mut resolved = HashMap::with_capacity(pending.len());
        let (mut hits, mut misses) = (0_u64, 0_u64);

        for Pending {
            id,
            cache_key,
            mut record,
        } in pending
        {
            let hit = cached
                .get(&cache_key)
                .and_then(|raw| parse_representation(&cache_key, raw));

            let representation = match hit {
                Some(representation) => {
                    hits += 1;
                    representation
                }
                None => {
                    misses += 1;
                    let registration = self.registry.lookup(&id.type_name, version)?;
                    if record.is_none() {
                        let loader = registration.get_loader().ok_or_else(|| {
                            CacheError::loader_not_found(&id.type_name, version)
                        })?;
                        record = self.load_with(loader, &id.type_name, &id.key).await?;
                    }
                    let serializer = registration.get_serializer().ok_or_else(|| {
                        CacheError::serializer_not_found(&id.type_name, version)
                    })?;
                    match self.serialize_with(serializer, record.as_ref())? {
                        Some(fresh) => {
                            to_set.insert(
                                cache_key.clone(),
                                encode_representation(&cache_key, &fresh)?,
                            );
                            fresh
                        }
                        None => Representation::new(),
                    }
                }
            };

            if representation.is_empty() {
                debug!(instance = %id, "No representation; omitted from result");
                continue;
            }

            let representation = self.codecs.decode_representation(representation)?;
            resolved.insert(
                id,
                ResolvedInstance {
                    representation,
                    cache_key,
                    record,
                },
            );
        }

        counter!(METRIC_HIT_TOTAL).increment(hits);
        counter!(METRIC_MISS_TOTAL).increment(misses);
        debug!(
            hits,
            misses,
            writes = to_set.len(),
            resolved = resolved.len(),
            "Instances resolved"
        );

        self.store.set_many(to_set).await;
        Ok(resolved)
    }

    /// Resolve a single instance.
    pub async fn get_instance(
        &self,
        type_name: &str,
        key: impl Into<PrimaryKey>,
        version: Option<&str>,
    ) -> Result<Option<ResolvedInstance<R>>, CacheError> {
        let id = InstanceId::new(type_name, key);
        let mut resolved = self
            .get_instances(
                vec![InstanceRequest::new(id.type_name.clone(), id.key.clone())],
                version,
            )
            .await?;
        Ok(resolved.remove(&id))
    }
}

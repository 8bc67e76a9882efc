//! Cache-backed list views.
//!
//! A [`CachedQuery`] asks a [`KeySource`] which primary keys match and in
//! what order, then reads the instances themselves through the cache.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::{CachedRecord, InstanceId, PrimaryKey, TypeDescriptor};

use super::error::{BoxError, QueryError};
use super::instance::InstanceCache;
use super::resolver::InstanceRequest;

/// Produces the ordered primary keys that match some query.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn keys(&self) -> Result<Vec<PrimaryKey>, BoxError>;

    async fn count(&self) -> Result<usize, BoxError> {
        Ok(self.keys().await?.len())
    }

    /// Keys at the given positions. Out-of-range bounds are clamped.
    async fn keys_in(&self, range: Range<usize>) -> Result<Vec<PrimaryKey>, BoxError> {
        let keys = self.keys().await?;
        Ok(clamp(&keys, range).to_vec())
    }
}

#[async_trait]
impl KeySource for Vec<PrimaryKey> {
    async fn keys(&self) -> Result<Vec<PrimaryKey>, BoxError> {
        Ok(self.clone())
    }

    async fn count(&self) -> Result<usize, BoxError> {
        Ok(self.len())
    }
}

fn clamp(keys: &[PrimaryKey], range: Range<usize>) -> &[PrimaryKey] {
    let end = range.end.min(keys.len());
    let start = range.start.min(end);
    &keys[start..end]
}

/// A queryset look-alike whose rows come from the instance cache.
pub struct CachedQuery<R> {
    cache: Arc<InstanceCache<R>>,
    descriptor: TypeDescriptor,
    source: Arc<dyn KeySource>,
    keys: OnceCell<Vec<PrimaryKey>>,
    version: Option<String>,
}

impl<R> CachedQuery<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<InstanceCache<R>>,
        descriptor: TypeDescriptor,
        source: Arc<dyn KeySource>,
    ) -> Self {
        Self {
            cache,
            descriptor,
            source,
            keys: OnceCell::new(),
            version: None,
        }
    }

    /// A query over a fixed list of keys.
    pub fn from_keys(
        cache: Arc<InstanceCache<R>>,
        descriptor: TypeDescriptor,
        keys: Vec<PrimaryKey>,
    ) -> Self {
        Self {
            keys: OnceCell::new_with(Some(keys.clone())),
            ..Self::new(cache, descriptor, Arc::new(keys))
        }
    }

    /// Read instances from a specific cache version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The matching keys, fetched from the source once and then reused.
    pub async fn keys(&self) -> Result<&[PrimaryKey], QueryError> {
        let keys = self
            .keys
            .get_or_try_init(|| async {
                self.source.keys().await.map_err(|source| self.source_error(source))
            })
            .await?;
        Ok(keys.as_slice())
    }

    /// The number of matches. Uses the source's count until keys are fetched.
    pub async fn count(&self) -> Result<usize, QueryError> {
        match self.keys.get() {
            Some(keys) => Ok(keys.len()),
            None => self
                .source
                .count()
                .await
                .map_err(|source| self.source_error(source)),
        }
    }

    /// Every matching record in key order, read with a single cache lookup.
    ///
    /// Keys without a representation are skipped.
    pub async fn records(&self) -> Result<Vec<CachedRecord>, QueryError> {
        let keys = self.keys().await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let type_name = self.descriptor.name();
        let requests = keys
            .iter()
            .map(|key| InstanceRequest::new(type_name, key.clone()))
            .collect();
        let resolved = self
            .cache
            .get_instances(requests, self.version.as_deref())
            .await?;

        let records: Vec<CachedRecord> = keys
            .iter()
            .filter_map(|key| {
                resolved
                    .get(&InstanceId::new(type_name, key.clone()))
                    .map(|instance| {
                        CachedRecord::new(self.descriptor.clone(), instance.representation.clone())
                    })
            })
            .collect();

        if records.len() < keys.len() {
            debug!(
                type_name,
                requested = keys.len(),
                found = records.len(),
                "Some keys had no cached representation"
            );
        }
        Ok(records)
    }

    /// The record with the given primary key, read straight from the cache.
    pub async fn get(&self, key: impl Into<PrimaryKey>) -> Result<CachedRecord, QueryError> {
        let key = key.into();
        let type_name = self.descriptor.name();
        match self
            .cache
            .get_instance(type_name, key.clone(), self.version.as_deref())
            .await?
        {
            Some(instance) => Ok(CachedRecord::new(
                self.descriptor.clone(),
                instance.representation,
            )),
            None => Err(QueryError::NotFound {
                type_name: type_name.to_string(),
                key,
            }),
        }
    }

    /// A query over the matches at the given positions.
    pub async fn slice(&self, range: Range<usize>) -> Result<Self, QueryError> {
        let keys = match self.keys.get() {
            Some(keys) => clamp(keys, range).to_vec(),
            None => self
                .source
                .keys_in(range)
                .await
                .map_err(|source| self.source_error(source))?,
        };
        Ok(self.derive(keys))
    }

    /// An empty query over the same type.
    pub fn none(&self) -> Self {
        self.derive(Vec::new())
    }

    /// The same query, sharing any keys already fetched.
    pub fn all(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            descriptor: self.descriptor.clone(),
            source: self.source.clone(),
            keys: OnceCell::new_with(self.keys.get().cloned()),
            version: self.version.clone(),
        }
    }

    fn derive(&self, keys: Vec<PrimaryKey>) -> Self {
        Self {
            version: self.version.clone(),
            ..Self::from_keys(self.cache.clone(), self.descriptor.clone(), keys)
        }
    }

    fn source_error(&self, source: BoxError) -> QueryError {
        QueryError::KeySource {
            type_name: self.descriptor.name().to_string(),
            source,
        }
    }
}

impl<R> fmt::Debug for CachedQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedQuery")
            .field("descriptor", &self.descriptor)
            .field("keys", &self.keys.get())
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ids: &[i64]) -> Vec<PrimaryKey> {
        ids.iter().copied().map(PrimaryKey::Int).collect()
    }

    #[tokio::test]
    async fn vec_source_defaults() {
        let source = keys(&[1, 2, 3, 4]);
        assert_eq!(source.count().await.unwrap(), 4);
        assert_eq!(source.keys_in(1..3).await.unwrap(), keys(&[2, 3]));
        assert_eq!(source.keys_in(3..10).await.unwrap(), keys(&[4]));
        assert!(source.keys_in(8..10).await.unwrap().is_empty());
    }

    #[test]
    fn clamp_handles_inverted_ranges() {
        let source = keys(&[1, 2]);
        #[allow(clippy::reversed_empty_ranges)]
        let range = 2..1;
        assert!(clamp(&source, range).is_empty());
    }
}

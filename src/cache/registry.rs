//! Per-type, per-version function registry.
//!
//! Each `(type_name, version)` pair maps to a [`Registration`] holding an
//! optional serializer, loader and invalidator. The table is filled once by
//! [`RegistryBuilder`] and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{PrimaryKey, Representation};

use super::codec::FieldCodecs;
use super::error::{BoxError, CacheError};

/// Builds the representation of a record. `None` stands for a missing record.
///
/// Returning `Ok(None)` (or an empty map) means "no representation".
pub trait Serializer<R>: Send + Sync {
    fn serialize(
        &self,
        record: Option<&R>,
        codecs: &FieldCodecs,
    ) -> Result<Option<Representation>, CacheError>;
}

impl<R, F> Serializer<R> for F
where
    F: Fn(Option<&R>, &FieldCodecs) -> Result<Option<Representation>, CacheError> + Send + Sync,
{
    fn serialize(
        &self,
        record: Option<&R>,
        codecs: &FieldCodecs,
    ) -> Result<Option<Representation>, CacheError> {
        self(record, codecs)
    }
}

/// Loads a record from the backing store. A missing row is `Ok(None)`, not an error.
#[async_trait]
pub trait Loader<R>: Send + Sync {
    async fn load(&self, key: &PrimaryKey) -> Result<Option<R>, BoxError>;
}

/// Names the cache entries that depend on a record.
#[async_trait]
pub trait Invalidator<R>: Send + Sync {
    async fn invalidate(&self, record: &R) -> Result<Vec<Invalidation>, BoxError>;
}

/// One dependency reported by an [`Invalidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// An arbitrary cache key, deleted as soon as it is reported.
    CacheKey(String),
    /// A cached instance to refresh. Immediate ones also lose their entry
    /// for the current version right away.
    Instance {
        type_name: String,
        key: PrimaryKey,
        immediate: bool,
    },
}

impl Invalidation {
    pub fn cache_key(key: impl Into<String>) -> Self {
        Self::CacheKey(key.into())
    }

    pub fn immediate(type_name: impl Into<String>, key: impl Into<PrimaryKey>) -> Self {
        Self::Instance {
            type_name: type_name.into(),
            key: key.into(),
            immediate: true,
        }
    }

    pub fn deferred(type_name: impl Into<String>, key: impl Into<PrimaryKey>) -> Self {
        Self::Instance {
            type_name: type_name.into(),
            key: key.into(),
            immediate: false,
        }
    }
}

/// [`Loader`] backed by an async closure taking the key by value.
pub struct LoaderFn<F>(F);

pub fn loader_fn<R, F, Fut>(f: F) -> LoaderFn<F>
where
    F: Fn(PrimaryKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<R>, BoxError>> + Send + 'static,
{
    LoaderFn(f)
}

#[async_trait]
impl<R, F, Fut> Loader<R> for LoaderFn<F>
where
    R: Send + 'static,
    F: Fn(PrimaryKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<R>, BoxError>> + Send + 'static,
{
    async fn load(&self, key: &PrimaryKey) -> Result<Option<R>, BoxError> {
        (self.0)(key.clone()).await
    }
}

/// [`Invalidator`] backed by a closure that returns an owned future.
pub struct InvalidatorFn<F>(F);

pub fn invalidator_fn<R, F, Fut>(f: F) -> InvalidatorFn<F>
where
    F: Fn(&R) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Invalidation>, BoxError>> + Send + 'static,
{
    InvalidatorFn(f)
}

#[async_trait]
impl<R, F, Fut> Invalidator<R> for InvalidatorFn<F>
where
    R: Sync + 'static,
    F: Fn(&R) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Invalidation>, BoxError>> + Send + 'static,
{
    async fn invalidate(&self, record: &R) -> Result<Vec<Invalidation>, BoxError> {
        (self.0)(record).await
    }
}

/// The serializer, loader and invalidator for one type and version.
pub struct Registration<R> {
    serializer: Option<Arc<dyn Serializer<R>>>,
    loader: Option<Arc<dyn Loader<R>>>,
    invalidator: Option<Arc<dyn Invalidator<R>>>,
}

impl<R> Registration<R> {
    pub fn new() -> Self {
        Self {
            serializer: None,
            loader: None,
            invalidator: None,
        }
    }

    /// A registration with all three functions absent. Updates for it are no-ops.
    pub fn unmanaged() -> Self {
        Self::new()
    }

    pub fn serializer(mut self, serializer: impl Serializer<R> + 'static) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn loader(mut self, loader: impl Loader<R> + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn invalidator(mut self, invalidator: impl Invalidator<R> + 'static) -> Self {
        self.invalidator = Some(Arc::new(invalidator));
        self
    }

    pub fn is_unmanaged(&self) -> bool {
        self.serializer.is_none() && self.loader.is_none() && self.invalidator.is_none()
    }

    pub fn get_serializer(&self) -> Option<&dyn Serializer<R>> {
        self.serializer.as_deref()
    }

    pub fn get_loader(&self) -> Option<&dyn Loader<R>> {
        self.loader.as_deref()
    }

    pub fn get_invalidator(&self) -> Option<&dyn Invalidator<R>> {
        self.invalidator.as_deref()
    }
}

impl<R> Default for Registration<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for Registration<R> {
    fn clone(&self) -> Self {
        Self {
            serializer: self.serializer.clone(),
            loader: self.loader.clone(),
            invalidator: self.invalidator.clone(),
        }
    }
}

impl<R> fmt::Debug for Registration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("serializer", &self.serializer.is_some())
            .field("loader", &self.loader.is_some())
            .field("invalidator", &self.invalidator.is_some())
            .finish()
    }
}

/// Immutable `(type_name, version) -> Registration` table.
pub struct Registry<R> {
    entries: HashMap<(String, String), Registration<R>>,
}

impl<R> Registry<R> {
    pub fn builder() -> RegistryBuilder<R> {
        RegistryBuilder {
            entries: HashMap::new(),
        }
    }

    /// Fails with [`CacheError::UnmanagedType`] when the pair was never registered.
    pub fn lookup(&self, type_name: &str, version: &str) -> Result<&Registration<R>, CacheError> {
        self.entries
            .get(&(type_name.to_string(), version.to_string()))
            .ok_or_else(|| CacheError::unmanaged(type_name, version))
    }

    pub fn contains(&self, type_name: &str, version: &str) -> bool {
        self.entries
            .contains_key(&(type_name.to_string(), version.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Versions referenced by any registration, sorted.
    pub(crate) fn registered_versions(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self
            .entries
            .keys()
            .map(|(_, version)| version.as_str())
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }
}

impl<R> fmt::Debug for Registry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries)
            .finish()
    }
}

pub struct RegistryBuilder<R> {
    entries: HashMap<(String, String), Registration<R>>,
}

impl<R> RegistryBuilder<R> {
    /// Bind a registration, replacing any earlier one for the same pair.
    pub fn register(
        mut self,
        type_name: impl Into<String>,
        version: impl Into<String>,
        registration: Registration<R>,
    ) -> Self {
        self.entries
            .insert((type_name.into(), version.into()), registration);
        self
    }

    /// Bind the same registration under several versions.
    pub fn register_versions<I, S>(
        mut self,
        type_name: &str,
        versions: I,
        registration: Registration<R>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for version in versions {
            self.entries.insert(
                (type_name.to_string(), version.into()),
                registration.clone(),
            );
        }
        self
    }

    pub fn build(self) -> Registry<R> {
        Registry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: i64,
        owner: i64,
    }

    fn serialize_widget(
        record: Option<&Widget>,
        codecs: &FieldCodecs,
    ) -> Result<Option<Representation>, CacheError> {
        let Some(widget) = record else {
            return Ok(None);
        };
        Ok(Some(codecs.representation().field("id", widget.id)?.build()))
    }

    fn widgets() -> Registry<Widget> {
        Registry::builder()
            .register(
                "Widget",
                "default",
                Registration::new()
                    .serializer(serialize_widget)
                    .loader(loader_fn(|key: PrimaryKey| async move {
                        Ok::<_, BoxError>(key.as_i64().map(|id| Widget { id, owner: 1 }))
                    }))
                    .invalidator(invalidator_fn(|widget: &Widget| {
                        let owner = widget.owner;
                        async move {
                            Ok::<_, BoxError>(vec![
                                Invalidation::cache_key("widget_count"),
                                Invalidation::deferred("Owner", owner),
                            ])
                        }
                    })),
            )
            .register("Gadget", "default", Registration::unmanaged())
            .build()
    }

    #[test]
    fn lookup_unknown_pair_is_unmanaged() {
        let registry = widgets();
        assert!(matches!(
            registry.lookup("Widget", "v2"),
            Err(CacheError::UnmanagedType { .. })
        ));
        assert!(matches!(
            registry.lookup("Nothing", "default"),
            Err(CacheError::UnmanagedType { .. })
        ));
        assert!(registry.lookup("Gadget", "default").unwrap().is_unmanaged());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn registered_functions_are_callable() {
        let registry = widgets();
        let registration = registry.lookup("Widget", "default").unwrap();
        let codecs = FieldCodecs::new();

        let widget = registration
            .get_loader()
            .unwrap()
            .load(&PrimaryKey::Int(3))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(widget, Widget { id: 3, owner: 1 });

        let representation = registration
            .get_serializer()
            .unwrap()
            .serialize(Some(&widget), &codecs)
            .unwrap()
            .unwrap();
        assert_eq!(json!(representation), json!({"id": 3}));

        let invalidations = registration
            .get_invalidator()
            .unwrap()
            .invalidate(&widget)
            .await
            .unwrap();
        assert_eq!(
            invalidations,
            vec![
                Invalidation::CacheKey("widget_count".to_string()),
                Invalidation::Instance {
                    type_name: "Owner".to_string(),
                    key: PrimaryKey::Int(1),
                    immediate: false,
                },
            ]
        );
    }

    #[test]
    fn register_versions_shares_one_registration() {
        let registry: Registry<Widget> = Registry::builder()
            .register_versions("Widget", ["v1", "v2"], Registration::new())
            .build();
        assert!(registry.contains("Widget", "v1"));
        assert!(registry.contains("Widget", "v2"));
        assert_eq!(registry.registered_versions(), vec!["v1", "v2"]);
    }
}

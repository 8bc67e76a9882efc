//! Cache key formatting.
//!
//! Every cached representation lives under
//! `{prefix}_{version}_{type_name}_{key}`.

use crate::domain::PrimaryKey;

pub const DEFAULT_KEY_PREFIX: &str = "drfc";

pub(crate) const KEY_SEPARATOR: char = '_';

/// Namespace for instance cache keys within a shared backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The cache key for one version of one instance.
    ///
    /// Keys render through their display form, so `Int(7)` and `Str("7")`
    /// share an entry. Version names may not contain the separator, see
    /// [`CacheConfig::validate`](super::CacheConfig::validate).
    pub fn key_for(&self, version: &str, type_name: &str, key: &PrimaryKey) -> String {
        format!(
            "{prefix}{KEY_SEPARATOR}{version}{KEY_SEPARATOR}{type_name}{KEY_SEPARATOR}{key}",
            prefix = self.prefix
        )
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

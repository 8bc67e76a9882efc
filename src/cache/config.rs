//! Cache configuration.
//!
//! Mirrors the `[cache]` and `[cascade]` sections of `instcache.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::error::CacheError;
use super::keys::{DEFAULT_KEY_PREFIX, KEY_SEPARATOR};

pub const DEFAULT_VERSION: &str = "default";

const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_MAX_DEPTH: u32 = 16;
const DEFAULT_BATCH_LIMIT: usize = 100;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Engine configuration for [`InstanceCache`](super::InstanceCache).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the engine runs against the "no cache" backend.
    pub enabled: bool,
    /// Representation versions, in the order updates process them.
    pub versions: Vec<String>,
    /// Version used when a caller names none.
    pub default_version: String,
    /// Namespace prefix for every cache key.
    pub key_prefix: String,
    /// Entry limit for the in-process backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            versions: vec![DEFAULT_VERSION.to_string()],
            default_version: DEFAULT_VERSION.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            versions: settings.versions.clone(),
            default_version: settings.default_version.clone(),
            key_prefix: settings.key_prefix.clone(),
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Configuration with the given versions; the first one becomes the default.
    pub fn with_versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let versions: Vec<String> = versions.into_iter().map(Into::into).collect();
        let default_version = versions
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        Self {
            versions,
            default_version,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.versions.is_empty() {
            return Err(CacheError::configuration(
                "at least one cache version must be configured",
            ));
        }
        if !self.versions.contains(&self.default_version) {
            return Err(CacheError::configuration(format!(
                "default version `{}` is not among the configured versions",
                self.default_version
            )));
        }
        if let Some(version) = self
            .versions
            .iter()
            .find(|version| version.is_empty() || version.contains(KEY_SEPARATOR))
        {
            return Err(CacheError::configuration(format!(
                "cache version `{version}` must be non-empty and must not contain `{KEY_SEPARATOR}`"
            )));
        }
        if self.key_prefix.is_empty() {
            return Err(CacheError::configuration("key prefix must not be empty"));
        }
        Ok(())
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Configuration for the in-process cascade queue and worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Cascade generations followed before further jobs are dropped.
    pub max_depth: u32,
    /// Maximum jobs drained per worker batch.
    pub batch_limit: usize,
    /// Pending jobs retained before new ones are dropped. Unbounded when unset.
    pub queue_limit: Option<usize>,
    /// Background worker wake-up interval (ms) when no notification arrives.
    pub poll_interval_ms: u64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            batch_limit: DEFAULT_BATCH_LIMIT,
            queue_limit: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CascadeSettings> for CascadeConfig {
    fn from(settings: &crate::config::CascadeSettings) -> Self {
        Self {
            max_depth: settings.max_depth.get(),
            batch_limit: settings.batch_limit.get(),
            queue_limit: settings.queue_limit.map(NonZeroUsize::get),
            poll_interval_ms: settings.poll_interval.as_millis() as u64,
        }
    }
}

impl CascadeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Returns the batch limit, clamping to 1 if zero.
    pub fn batch_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

//! Configuration layer: typed settings with layered precedence (files → environment).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::Path,
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{DEFAULT_KEY_PREFIX, DEFAULT_VERSION, KEY_SEPARATOR};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "instcache";
const ENV_PREFIX: &str = "INSTCACHE";
const DEFAULT_MEMORY_CAPACITY: u64 = 10_000;
const DEFAULT_CASCADE_MAX_DEPTH: u64 = 16;
const DEFAULT_CASCADE_BATCH_LIMIT: u64 = 100;
const DEFAULT_CASCADE_POLL_INTERVAL_MS: u64 = 1_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: CacheSettings,
    pub cascade: CascadeSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Supported representation versions, in order.
    pub versions: Vec<String>,
    pub default_version: String,
    pub key_prefix: String,
    /// Entry limit for the in-process backend.
    pub memory_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct CascadeSettings {
    pub max_depth: NonZeroU32,
    pub batch_limit: NonZeroUsize,
    /// `None` leaves the queue unbounded.
    pub queue_limit: Option<NonZeroUsize>,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence.
///
/// `config/default.*` and `instcache.*` are optional; `config_file` is
/// required when given. `INSTCACHE__SECTION__KEY` variables override files.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.versions")
            .try_parsing(true),
    );

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            cache,
            cascade,
            logging,
        } = raw;

        let cache = build_cache_settings(cache)?;
        let cascade = build_cascade_settings(cascade)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            cache,
            cascade,
            logging,
        })
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let versions: Vec<String> = cache
        .versions
        .unwrap_or_else(|| vec![DEFAULT_VERSION.to_string()])
        .into_iter()
        .map(|version| version.trim().to_string())
        .collect();
    if versions.is_empty() {
        return Err(LoadError::invalid(
            "cache.versions",
            "at least one version is required",
        ));
    }
    if versions.iter().any(String::is_empty) {
        return Err(LoadError::invalid(
            "cache.versions",
            "version names must not be empty",
        ));
    }
    if let Some(version) = versions.iter().find(|v| v.contains(KEY_SEPARATOR)) {
        return Err(LoadError::invalid(
            "cache.versions",
            format!("`{version}` must not contain `{KEY_SEPARATOR}`"),
        ));
    }

    let default_version = match cache.default_version {
        Some(version) => version.trim().to_string(),
        None if versions.iter().any(|v| v == DEFAULT_VERSION) => DEFAULT_VERSION.to_string(),
        None => versions[0].clone(),
    };
    if !versions.contains(&default_version) {
        return Err(LoadError::invalid(
            "cache.default_version",
            format!("`{default_version}` is not one of the configured versions"),
        ));
    }

    let key_prefix = cache
        .key_prefix
        .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());
    if key_prefix.trim().is_empty() {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "prefix must not be empty",
        ));
    }

    let memory_capacity = non_zero_usize(
        cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
        "cache.memory_capacity",
    )?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        versions,
        default_version,
        key_prefix,
        memory_capacity,
    })
}

fn build_cascade_settings(cascade: RawCascadeSettings) -> Result<CascadeSettings, LoadError> {
    let max_depth = non_zero_u32(
        cascade.max_depth.unwrap_or(DEFAULT_CASCADE_MAX_DEPTH),
        "cascade.max_depth",
    )?;
    let batch_limit = non_zero_usize(
        cascade.batch_limit.unwrap_or(DEFAULT_CASCADE_BATCH_LIMIT),
        "cascade.batch_limit",
    )?;
    let queue_limit = cascade
        .queue_limit
        .map(|limit| non_zero_usize(limit, "cascade.queue_limit"))
        .transpose()?;

    let poll_interval_ms = cascade
        .poll_interval_ms
        .unwrap_or(DEFAULT_CASCADE_POLL_INTERVAL_MS);
    if poll_interval_ms == 0 {
        return Err(LoadError::invalid(
            "cascade.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(CascadeSettings {
        max_depth,
        batch_limit,
        queue_limit,
        poll_interval: Duration::from_millis(poll_interval_ms),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    cache: RawCacheSettings,
    cascade: RawCascadeSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    versions: Option<Vec<String>>,
    default_version: Option<String>,
    key_prefix: Option<String>,
    memory_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCascadeSettings {
    max_depth: Option<u64>,
    batch_limit: Option<u64>,
    queue_limit: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize)
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

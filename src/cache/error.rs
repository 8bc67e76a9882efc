use thiserror::Error;

use crate::domain::{FieldError, PrimaryKey};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the instance cache.
///
/// Every variant is a configuration or collaborator defect. Absent records
/// and an unavailable cache backend are normal control flow and never
/// produce an error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("type `{type_name}` has no registration for cache version `{version}`")]
    UnmanagedType { type_name: String, version: String },
    #[error("type `{type_name}` has no loader for cache version `{version}`")]
    LoaderNotFound { type_name: String, version: String },
    #[error("type `{type_name}` has no serializer for cache version `{version}`")]
    SerializerNotFound { type_name: String, version: String },
    #[error("no field codec registered for type code `{type_code}`")]
    UnknownTypeCode { type_code: String },
    #[error("field name `{name}` must not contain `{delimiter}`")]
    InvalidFieldName { name: String, delimiter: char },
    #[error("type code `{type_code}` must be non-empty and must not contain `{delimiter}`")]
    InvalidTypeCode { type_code: String, delimiter: char },
    #[error("field `{field}` appears both typed and untyped in one representation")]
    DuplicateField { field: String },
    #[error("invalid value for type code `{type_code}`: {reason}")]
    InvalidFieldValue { type_code: String, reason: String },
    #[error("failed to encode representation for cache key `{cache_key}`: {source}")]
    Encode {
        cache_key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("loader for `{type_name}` failed on key `{key}`: {source}")]
    Load {
        type_name: String,
        key: PrimaryKey,
        #[source]
        source: BoxError,
    },
    #[error("invalidator for `{type_name}` failed on key `{key}`: {source}")]
    Invalidate {
        type_name: String,
        key: PrimaryKey,
        #[source]
        source: BoxError,
    },
    #[error("cache configuration error: {message}")]
    Configuration { message: String },
}

impl CacheError {
    pub fn unmanaged(type_name: &str, version: &str) -> Self {
        Self::UnmanagedType {
            type_name: type_name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn loader_not_found(type_name: &str, version: &str) -> Self {
        Self::LoaderNotFound {
            type_name: type_name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn serializer_not_found(type_name: &str, version: &str) -> Self {
        Self::SerializerNotFound {
            type_name: type_name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn invalid_value(type_code: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            type_code: type_code.to_string(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// A failed call to the shared cache backend.
///
/// The representation store absorbs these: reads degrade to misses and
/// writes to no-ops.
#[derive(Debug, Error)]
#[error("cache backend `{operation}` failed: {message}")]
pub struct BackendError {
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Errors raised by [`CachedQuery`](super::CachedQuery).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("key source for `{type_name}` failed: {source}")]
    KeySource {
        type_name: String,
        #[source]
        source: BoxError,
    },
    #[error("no `{type_name}` matches key `{key}`")]
    NotFound { type_name: String, key: PrimaryKey },
}

use thiserror::Error;

/// Errors raised by the record stand-ins when a caller asks for data the
/// cached representation does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("`{type_name}` record has no field `{field}`")]
    Missing { type_name: String, field: String },
    #[error("field `{field}` is not {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
    #[error("only the primary key field `{pk_field}` can be projected, not `{field}`")]
    UnsupportedProjection { pk_field: String, field: String },
}

impl FieldError {
    pub fn missing(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Missing {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    pub fn type_mismatch(field: impl Into<String>, expected: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
        }
    }
}

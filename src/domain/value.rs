//! Stored and decoded representation types.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use super::reference::{KeyOnlyCollection, KeyOnlyReference};

/// The JSON-safe form of a record as persisted in the shared cache.
///
/// Keys are either bare field names holding native JSON values, or
/// `name:TYPECODE` holding a codec-encoded value.
pub type Representation = Map<String, Value>;

/// A representation after every typed field has been decoded.
pub type DecodedRepresentation = BTreeMap<String, FieldValue>;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A value stored as native JSON, or a typed field whose stored value was `null`.
    Json(Value),
    Date(Date),
    DateTime(OffsetDateTime),
    Reference(KeyOnlyReference),
    Collection(KeyOnlyCollection),
}

impl FieldValue {
    pub fn null() -> Self {
        Self::Json(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }

    /// A timestamp without an offset, interpreted as UTC.
    pub fn naive_datetime(value: PrimitiveDateTime) -> Self {
        Self::DateTime(value.assume_utc())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "a JSON value",
            Self::Date(_) => "a date",
            Self::DateTime(_) => "a timestamp",
            Self::Reference(_) => "a reference",
            Self::Collection(_) => "a collection",
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<Date> for FieldValue {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<PrimitiveDateTime> for FieldValue {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::naive_datetime(value)
    }
}

impl From<KeyOnlyReference> for FieldValue {
    fn from(value: KeyOnlyReference) -> Self {
        Self::Reference(value)
    }
}

impl From<KeyOnlyCollection> for FieldValue {
    fn from(value: KeyOnlyCollection) -> Self {
        Self::Collection(value)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(Self::null)
    }
}

//! Identity types shared by the cache engine and its collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primary key of a cached record.
///
/// Serialized untagged so the JSON form is the bare number or string, and
/// rendered bare inside cache keys (`drfc_default_User_7`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl PrimaryKey {
    /// Interpret a JSON scalar as a primary key.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(Self::Int),
            Value::String(text) => Some(Self::Str(text.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::Str(value) => Value::from(value.as_str()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PrimaryKey {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for PrimaryKey {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A `(type name, primary key)` pair identifying one cached instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    pub type_name: String,
    pub key: PrimaryKey,
}

impl InstanceId {
    pub fn new(type_name: impl Into<String>, key: impl Into<PrimaryKey>) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.key)
    }
}

/// A dependent instance whose cached representation must be refreshed
/// for one cache version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CascadeTarget {
    pub type_name: String,
    pub key: PrimaryKey,
    pub version: String,
}

impl CascadeTarget {
    pub fn new(
        type_name: impl Into<String>,
        key: impl Into<PrimaryKey>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for CascadeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.type_name, self.key, self.version)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn primary_key_serializes_untagged() {
        assert_eq!(serde_json::to_value(PrimaryKey::Int(7)).unwrap(), json!(7));
        assert_eq!(
            serde_json::to_value(PrimaryKey::from("abc")).unwrap(),
            json!("abc")
        );

        let parsed: Vec<PrimaryKey> = serde_json::from_value(json!([1, "two"])).unwrap();
        assert_eq!(parsed, vec![PrimaryKey::Int(1), PrimaryKey::from("two")]);
    }

    #[test]
    fn primary_key_from_json_rejects_non_scalars() {
        assert_eq!(PrimaryKey::from_json(&json!(3)), Some(PrimaryKey::Int(3)));
        assert_eq!(PrimaryKey::from_json(&json!(1.5)), None);
        assert_eq!(PrimaryKey::from_json(&json!(null)), None);
        assert_eq!(PrimaryKey::from_json(&json!([1])), None);
    }

    #[test]
    fn display_is_bare() {
        assert_eq!(PrimaryKey::Int(42).to_string(), "42");
        assert_eq!(PrimaryKey::from("slug").to_string(), "slug");
        assert_eq!(InstanceId::new("User", 7).to_string(), "User:7");
        assert_eq!(
            CascadeTarget::new("User", 7, "v2").to_string(),
            "User:7@v2"
        );
    }
}

//! Field codec registry.
//!
//! Converts typed field values to and from the JSON stored in a cache entry.
//! A typed field is stored under `name:TYPECODE`; the type code selects the
//! codec on the way back out. Codecs are looked up case-insensitively.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use time::{Date, Duration, Month, OffsetDateTime};

use crate::domain::{
    DecodedRepresentation, FieldValue, KeyOnlyCollection, KeyOnlyReference, PrimaryKey,
    Representation, TypeDescriptor,
};

use super::error::CacheError;

/// Separates a field name from its type code in a representation key.
pub const TYPE_DELIMITER: char = ':';

pub const DATE: &str = "Date";
pub const DATETIME: &str = "DateTime";
pub const PK: &str = "PK";
pub const PK_LIST: &str = "PKList";

/// Converter between one family of native values and its JSON form.
pub trait FieldCodec: Send + Sync {
    fn to_json(&self, type_code: &str, value: &FieldValue) -> Result<Value, CacheError>;

    fn from_json(&self, type_code: &str, value: Value) -> Result<FieldValue, CacheError>;
}

/// Descriptors known to the PK codecs, so decoded references carry the
/// declared primary key field of their type.
#[derive(Debug, Default)]
struct TypeCatalog {
    types: HashMap<(String, String), TypeDescriptor>,
}

impl TypeCatalog {
    fn new(types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        let types = types
            .into_iter()
            .map(|descriptor| {
                (
                    (
                        descriptor.namespace().to_string(),
                        descriptor.name().to_string(),
                    ),
                    descriptor,
                )
            })
            .collect();
        Self { types }
    }

    fn resolve(&self, namespace: &str, name: &str) -> TypeDescriptor {
        self.types
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_else(|| TypeDescriptor::new(namespace, name))
    }
}

/// Registry of field codecs keyed by type code.
#[derive(Clone)]
pub struct FieldCodecs {
    codecs: HashMap<String, Arc<dyn FieldCodec>>,
}

impl FieldCodecs {
    /// Registry holding the built-in `Date`, `DateTime`, `PK` and `PKList` codecs.
    pub fn new() -> Self {
        Self::with_types(std::iter::empty())
    }

    /// Built-in codecs whose references resolve against the given type catalog.
    pub fn with_types(types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        let catalog = Arc::new(TypeCatalog::new(types));
        let mut codecs: HashMap<String, Arc<dyn FieldCodec>> = HashMap::new();
        codecs.insert(normalize(DATE), Arc::new(DateCodec));
        codecs.insert(normalize(DATETIME), Arc::new(DateTimeCodec));
        codecs.insert(
            normalize(PK),
            Arc::new(PkCodec {
                catalog: catalog.clone(),
            }),
        );
        codecs.insert(normalize(PK_LIST), Arc::new(PkListCodec { catalog }));
        Self { codecs }
    }

    /// Register an additional codec, replacing any codec with the same type code.
    pub fn register(
        &mut self,
        type_code: &str,
        codec: impl FieldCodec + 'static,
    ) -> Result<(), CacheError> {
        if type_code.is_empty() || type_code.contains(TYPE_DELIMITER) {
            return Err(CacheError::InvalidTypeCode {
                type_code: type_code.to_string(),
                delimiter: TYPE_DELIMITER,
            });
        }
        self.codecs.insert(normalize(type_code), Arc::new(codec));
        Ok(())
    }

    pub fn with_codec(
        mut self,
        type_code: &str,
        codec: impl FieldCodec + 'static,
    ) -> Result<Self, CacheError> {
        self.register(type_code, codec)?;
        Ok(self)
    }

    pub fn contains(&self, type_code: &str) -> bool {
        self.codecs.contains_key(&normalize(type_code))
    }

    fn codec(&self, type_code: &str) -> Result<&Arc<dyn FieldCodec>, CacheError> {
        self.codecs
            .get(&normalize(type_code))
            .ok_or_else(|| CacheError::UnknownTypeCode {
                type_code: type_code.to_string(),
            })
    }

    /// Encode a native value, returning the `name:TYPECODE` key and its JSON value.
    pub fn encode(
        &self,
        type_code: &str,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<(String, Value), CacheError> {
        check_field_name(field_name)?;
        let codec = self.codec(type_code)?;
        let json_value = codec.to_json(type_code, value)?;
        Ok((
            format!("{field_name}{TYPE_DELIMITER}{type_code}"),
            json_value,
        ))
    }

    /// Decode one representation entry back to its field name and native value.
    ///
    /// A key without a type code is already native and is passed through.
    pub fn decode(
        &self,
        key_and_type: &str,
        json_value: Value,
    ) -> Result<(String, FieldValue), CacheError> {
        match key_and_type.split_once(TYPE_DELIMITER) {
            Some((name, type_code)) => {
                let value = self.codec(type_code)?.from_json(type_code, json_value)?;
                Ok((name.to_string(), value))
            }
            None => Ok((key_and_type.to_string(), FieldValue::Json(json_value))),
        }
    }

    /// Decode every typed field of a representation.
    pub fn decode_representation(
        &self,
        representation: Representation,
    ) -> Result<DecodedRepresentation, CacheError> {
        let mut decoded = DecodedRepresentation::new();
        let mut typed = Vec::new();
        for (key, value) in representation {
            if key.contains(TYPE_DELIMITER) {
                typed.push((key, value));
            } else {
                decoded.insert(key, FieldValue::Json(value));
            }
        }

        for (key, value) in typed {
            let (name, value) = self.decode(&key, value)?;
            if decoded.contains_key(&name) {
                return Err(CacheError::DuplicateField { field: name });
            }
            decoded.insert(name, value);
        }

        Ok(decoded)
    }

    /// Start building a representation whose typed fields use this registry.
    pub fn representation(&self) -> RepresentationBuilder<'_> {
        RepresentationBuilder {
            codecs: self,
            fields: Representation::new(),
        }
    }
}

impl Default for FieldCodecs {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(type_code: &str) -> String {
    type_code.to_ascii_lowercase()
}

fn check_field_name(name: &str) -> Result<(), CacheError> {
    if name.contains(TYPE_DELIMITER) {
        return Err(CacheError::InvalidFieldName {
            name: name.to_string(),
            delimiter: TYPE_DELIMITER,
        });
    }
    Ok(())
}

/// Assembles a [`Representation`] field by field.
pub struct RepresentationBuilder<'a> {
    codecs: &'a FieldCodecs,
    fields: Representation,
}

impl RepresentationBuilder<'_> {
    /// Add a field holding a native JSON value.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Result<Self, CacheError> {
        check_field_name(name)?;
        self.fields.insert(name.to_string(), value.into());
        Ok(self)
    }

    /// Add a field encoded by the codec registered for `type_code`.
    pub fn typed(
        mut self,
        type_code: &str,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Self, CacheError> {
        let (key, value) = self.codecs.encode(type_code, name, &value.into())?;
        self.fields.insert(key, value);
        Ok(self)
    }

    pub fn build(self) -> Representation {
        self.fields
    }
}

/// Stores a JSON value unchanged. Useful for tagging plain fields, e.g. `Str`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughCodec;

impl FieldCodec for PassThroughCodec {
    fn to_json(&self, type_code: &str, value: &FieldValue) -> Result<Value, CacheError> {
        match value {
            FieldValue::Json(value) => Ok(value.clone()),
            other => Err(mismatch(type_code, "a JSON value", other)),
        }
    }

    fn from_json(&self, _type_code: &str, value: Value) -> Result<FieldValue, CacheError> {
        Ok(FieldValue::Json(value))
    }
}

fn mismatch(type_code: &str, expected: &str, actual: &FieldValue) -> CacheError {
    CacheError::invalid_value(
        type_code,
        format!("expected {expected}, got {}", actual.kind()),
    )
}

/// `[year, month, day]`.
struct DateCodec;

impl FieldCodec for DateCodec {
    fn to_json(&self, type_code: &str, value: &FieldValue) -> Result<Value, CacheError> {
        match value {
            FieldValue::Date(day) => Ok(json!([day.year(), u8::from(day.month()), day.day()])),
            value if value.is_null() => Ok(Value::Null),
            other => Err(mismatch(type_code, "a date", other)),
        }
    }

    fn from_json(&self, type_code: &str, value: Value) -> Result<FieldValue, CacheError> {
        let parts = match value {
            Value::Null => return Ok(FieldValue::null()),
            Value::Array(parts) if parts.len() == 3 => parts,
            other => {
                return Err(CacheError::invalid_value(
                    type_code,
                    format!("expected [year, month, day], got {other}"),
                ));
            }
        };

        let component = |index: usize| {
            parts[index].as_i64().ok_or_else(|| {
                CacheError::invalid_value(type_code, "date components must be integers")
            })
        };
        let year = i32::try_from(component(0)?)
            .map_err(|_| CacheError::invalid_value(type_code, "year out of range"))?;
        let month = u8::try_from(component(1)?)
            .ok()
            .and_then(|month| Month::try_from(month).ok())
            .ok_or_else(|| CacheError::invalid_value(type_code, "month out of range"))?;
        let day = u8::try_from(component(2)?)
            .map_err(|_| CacheError::invalid_value(type_code, "day out of range"))?;

        Date::from_calendar_date(year, month, day)
            .map(FieldValue::Date)
            .map_err(|err| CacheError::invalid_value(type_code, err.to_string()))
    }
}

/// UTC Unix timestamp: an integer when there is no sub-second part,
/// otherwise the string `"seconds.microseconds"` with six fraction digits.
struct DateTimeCodec;

const MICROS_PER_SECOND: i64 = 1_000_000;

impl FieldCodec for DateTimeCodec {
    fn to_json(&self, type_code: &str, value: &FieldValue) -> Result<Value, CacheError> {
        match value {
            FieldValue::DateTime(dt) => {
                let seconds = dt.unix_timestamp();
                let micros = dt.microsecond();
                if micros == 0 {
                    Ok(Value::from(seconds))
                } else {
                    Ok(Value::from(format!("{seconds}.{micros:06}")))
                }
            }
            value if value.is_null() => Ok(Value::Null),
            other => Err(mismatch(type_code, "a timestamp", other)),
        }
    }

    fn from_json(&self, type_code: &str, value: Value) -> Result<FieldValue, CacheError> {
        let (seconds, micros) = match &value {
            Value::Null => return Ok(FieldValue::null()),
            Value::Number(number) => {
                let seconds = number.as_i64().ok_or_else(|| {
                    CacheError::invalid_value(type_code, "timestamp must be an integer")
                })?;
                (seconds, 0)
            }
            Value::String(text) => parse_timestamp(text)
                .ok_or_else(|| CacheError::invalid_value(type_code, format!("`{text}`")))?,
            other => {
                return Err(CacheError::invalid_value(
                    type_code,
                    format!("expected a timestamp, got {other}"),
                ));
            }
        };

        OffsetDateTime::from_unix_timestamp(seconds)
            .map(|dt| dt + Duration::microseconds(micros))
            .map(FieldValue::DateTime)
            .map_err(|err| CacheError::invalid_value(type_code, err.to_string()))
    }
}

fn parse_timestamp(text: &str) -> Option<(i64, i64)> {
    match text.split_once('.') {
        Some((seconds, micros)) => {
            let micros: i64 = micros.parse().ok()?;
            (0..MICROS_PER_SECOND)
                .contains(&micros)
                .then_some((seconds.parse().ok()?, micros))
        }
        None => Some((text.parse().ok()?, 0)),
    }
}

/// `{type, subtype, key}` resolving to a [`KeyOnlyReference`].
struct PkCodec {
    catalog: Arc<TypeCatalog>,
}

impl FieldCodec for PkCodec {
    fn to_json(&self, type_code: &str, value: &FieldValue) -> Result<Value, CacheError> {
        match value {
            FieldValue::Reference(reference) => {
                let mut object = type_header(reference.descriptor());
                object.insert("key".into(), reference.key().to_json());
                Ok(Value::Object(object))
            }
            value if value.is_null() => Ok(Value::Null),
            other => Err(mismatch(type_code, "a reference", other)),
        }
    }

    fn from_json(&self, type_code: &str, value: Value) -> Result<FieldValue, CacheError> {
        if value.is_null() {
            return Ok(FieldValue::null());
        }
        let descriptor = read_type_header(&self.catalog, type_code, &value)?;
        let key = value
            .get("key")
            .and_then(PrimaryKey::from_json)
            .ok_or_else(|| CacheError::invalid_value(type_code, "missing or invalid `key`"))?;
        Ok(FieldValue::Reference(KeyOnlyReference::new(descriptor, key)))
    }
}

/// `{type, subtype, keys: [...]}` resolving to a [`KeyOnlyCollection`].
struct PkListCodec {
    catalog: Arc<TypeCatalog>,
}

impl FieldCodec for PkListCodec {
    fn to_json(&self, type_code: &str, value: &FieldValue) -> Result<Value, CacheError> {
        match value {
            FieldValue::Collection(collection) => {
                let mut object = type_header(collection.descriptor());
                let keys = collection.keys().iter().map(PrimaryKey::to_json).collect();
                object.insert("keys".into(), Value::Array(keys));
                Ok(Value::Object(object))
            }
            value if value.is_null() => Ok(Value::Null),
            other => Err(mismatch(type_code, "a collection", other)),
        }
    }

    fn from_json(&self, type_code: &str, value: Value) -> Result<FieldValue, CacheError> {
        if value.is_null() {
            return Ok(FieldValue::null());
        }
        let descriptor = read_type_header(&self.catalog, type_code, &value)?;
        let keys = value
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| CacheError::invalid_value(type_code, "missing `keys` list"))?
            .iter()
            .map(|key| {
                PrimaryKey::from_json(key)
                    .ok_or_else(|| CacheError::invalid_value(type_code, format!("bad key {key}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldValue::Collection(KeyOnlyCollection::new(descriptor, keys)))
    }
}

fn type_header(descriptor: &TypeDescriptor) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("type".into(), Value::from(descriptor.namespace()));
    object.insert("subtype".into(), Value::from(descriptor.name()));
    object
}

fn read_type_header(
    catalog: &TypeCatalog,
    type_code: &str,
    value: &Value,
) -> Result<TypeDescriptor, CacheError> {
    let text = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| CacheError::invalid_value(type_code, format!("missing `{field}`")))
    };
    Ok(catalog.resolve(text("type")?, text("subtype")?))
}

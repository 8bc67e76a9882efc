//! Record stand-in backed by a decoded cache representation.

use serde_json::Value;
use time::{Date, OffsetDateTime};

use super::error::FieldError;
use super::key::PrimaryKey;
use super::reference::{KeyOnlyCollection, KeyOnlyReference, TypeDescriptor};
use super::value::{DecodedRepresentation, FieldValue};

/// A record served from the cache instead of the backing store.
///
/// Field lookup is explicit: a field is either present in the decoded
/// representation or missing, except for `pk`, which resolves to the
/// type's declared primary key field.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecord {
    descriptor: TypeDescriptor,
    fields: DecodedRepresentation,
}

impl CachedRecord {
    pub fn new(descriptor: TypeDescriptor, fields: DecodedRepresentation) -> Self {
        Self { descriptor, fields }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn fields(&self) -> &DecodedRepresentation {
        &self.fields
    }

    pub fn into_fields(self) -> DecodedRepresentation {
        self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Result<&FieldValue, FieldError> {
        if let Some(value) = self.fields.get(field) {
            return Ok(value);
        }
        self.fields
            .get(self.descriptor.resolve_field(field))
            .ok_or_else(|| FieldError::missing(self.descriptor.name(), field))
    }

    /// The primary key, read through the `pk` alias.
    pub fn pk(&self) -> Result<PrimaryKey, FieldError> {
        match self.get("pk")? {
            FieldValue::Json(value) => PrimaryKey::from_json(value)
                .ok_or_else(|| FieldError::type_mismatch("pk", "a primary key")),
            _ => Err(FieldError::type_mismatch("pk", "a primary key")),
        }
    }

    pub fn json(&self, field: &str) -> Result<&Value, FieldError> {
        match self.get(field)? {
            FieldValue::Json(value) => Ok(value),
            _ => Err(FieldError::type_mismatch(field, "a JSON value")),
        }
    }

    pub fn str(&self, field: &str) -> Result<&str, FieldError> {
        self.json(field)?
            .as_str()
            .ok_or_else(|| FieldError::type_mismatch(field, "a string"))
    }

    pub fn i64(&self, field: &str) -> Result<i64, FieldError> {
        self.json(field)?
            .as_i64()
            .ok_or_else(|| FieldError::type_mismatch(field, "an integer"))
    }

    pub fn bool(&self, field: &str) -> Result<bool, FieldError> {
        self.json(field)?
            .as_bool()
            .ok_or_else(|| FieldError::type_mismatch(field, "a boolean"))
    }

    /// A date field; `Ok(None)` when the stored date was null.
    pub fn date(&self, field: &str) -> Result<Option<Date>, FieldError> {
        match self.get(field)? {
            FieldValue::Date(value) => Ok(Some(*value)),
            value if value.is_null() => Ok(None),
            _ => Err(FieldError::type_mismatch(field, "a date")),
        }
    }

    /// A timestamp field; `Ok(None)` when the stored timestamp was null.
    pub fn datetime(&self, field: &str) -> Result<Option<OffsetDateTime>, FieldError> {
        match self.get(field)? {
            FieldValue::DateTime(value) => Ok(Some(*value)),
            value if value.is_null() => Ok(None),
            _ => Err(FieldError::type_mismatch(field, "a timestamp")),
        }
    }

    pub fn reference(&self, field: &str) -> Result<Option<&KeyOnlyReference>, FieldError> {
        match self.get(field)? {
            FieldValue::Reference(value) => Ok(Some(value)),
            value if value.is_null() => Ok(None),
            _ => Err(FieldError::type_mismatch(field, "a reference")),
        }
    }

    pub fn collection(&self, field: &str) -> Result<&KeyOnlyCollection, FieldError> {
        match self.get(field)? {
            FieldValue::Collection(value) => Ok(value),
            _ => Err(FieldError::type_mismatch(field, "a collection")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn sample() -> CachedRecord {
        let mut fields = DecodedRepresentation::new();
        fields.insert("id".into(), json!(7).into());
        fields.insert("username".into(), "frank".into());
        fields.insert("is_staff".into(), false.into());
        fields.insert(
            "joined".into(),
            FieldValue::DateTime(datetime!(2014-09-22 08:52:00 UTC)),
        );
        fields.insert("birthday".into(), FieldValue::null());
        fields.insert(
            "votes".into(),
            FieldValue::Collection(KeyOnlyCollection::new(
                TypeDescriptor::new("polls", "Choice"),
                [1, 2],
            )),
        );
        CachedRecord::new(TypeDescriptor::new("auth", "User"), fields)
    }

    #[test]
    fn has_data() {
        let record = sample();
        assert_eq!(record.str("username").unwrap(), "frank");
        assert_eq!(record.i64("id").unwrap(), 7);
        assert!(!record.bool("is_staff").unwrap());
        assert_eq!(
            record.datetime("joined").unwrap(),
            Some(datetime!(2014-09-22 08:52:00 UTC))
        );
        assert_eq!(record.date("birthday").unwrap(), None);
        assert_eq!(record.collection("votes").unwrap().len(), 2);
    }

    #[test]
    fn pk_alias_maps_to_declared_field() {
        let record = sample();
        assert_eq!(record.pk().unwrap(), PrimaryKey::Int(7));
        assert_eq!(record.get("pk").unwrap(), record.get("id").unwrap());
    }

    #[test]
    fn pk_alias_respects_custom_field() {
        let mut fields = DecodedRepresentation::new();
        fields.insert("slug".into(), "hello".into());
        let record = CachedRecord::new(
            TypeDescriptor::new("blog", "Post").with_pk_field("slug"),
            fields,
        );
        assert_eq!(record.pk().unwrap(), PrimaryKey::from("hello"));
    }

    #[test]
    fn does_not_have_data() {
        let record = sample();
        let err = record.get("email").unwrap_err();
        assert_eq!(err, FieldError::missing("User", "email"));
    }

    #[test]
    fn wrong_accessor_is_type_mismatch() {
        let record = sample();
        assert!(matches!(
            record.str("id"),
            Err(FieldError::TypeMismatch { .. })
        ));
        assert!(matches!(
            record.date("joined"),
            Err(FieldError::TypeMismatch { .. })
        ));
    }
}

//! Key-only stand-ins for related records.
//!
//! A cached representation refers to related records by identity only, so
//! hydrating one instance never recursively hydrates its relations.

use super::error::FieldError;
use super::key::PrimaryKey;

const DEFAULT_PK_FIELD: &str = "id";
const PK_ALIAS: &str = "pk";

/// Names a record type: a namespace (the owning app or schema), the type
/// name used in cache keys, and the declared primary key field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    namespace: String,
    name: String,
    pk_field: String,
}

impl TypeDescriptor {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            pk_field: DEFAULT_PK_FIELD.to_string(),
        }
    }

    pub fn with_pk_field(mut self, pk_field: impl Into<String>) -> Self {
        self.pk_field = pk_field.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The type name used for registry lookups and cache keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pk_field(&self) -> &str {
        &self.pk_field
    }

    /// Resolve the `pk` alias to the declared primary key field.
    pub fn resolve_field<'a>(&'a self, field: &'a str) -> &'a str {
        if field == PK_ALIAS {
            &self.pk_field
        } else {
            field
        }
    }
}

/// A related record known only by its primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyOnlyReference {
    descriptor: TypeDescriptor,
    key: PrimaryKey,
}

impl KeyOnlyReference {
    pub fn new(descriptor: TypeDescriptor, key: impl Into<PrimaryKey>) -> Self {
        Self {
            descriptor,
            key: key.into(),
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> &PrimaryKey {
        &self.key
    }

    pub fn pk(&self) -> &PrimaryKey {
        &self.key
    }
}

/// An ordered collection of related records known only by their keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyOnlyCollection {
    descriptor: TypeDescriptor,
    keys: Vec<PrimaryKey>,
}

impl KeyOnlyCollection {
    pub fn new<K>(descriptor: TypeDescriptor, keys: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<PrimaryKey>,
    {
        Self {
            descriptor,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn keys(&self) -> &[PrimaryKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Unfiltered view of the collection.
    pub fn all(&self) -> &Self {
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = KeyOnlyReference> + '_ {
        self.keys
            .iter()
            .map(|key| KeyOnlyReference::new(self.descriptor.clone(), key.clone()))
    }

    /// Project the primary key field. Only the declared key field (or its
    /// `pk` alias) is available on a key-only collection.
    pub fn values_list(&self, field: &str) -> Result<&[PrimaryKey], FieldError> {
        if self.descriptor.resolve_field(field) == self.descriptor.pk_field() {
            Ok(&self.keys)
        } else {
            Err(FieldError::UnsupportedProjection {
                pk_field: self.descriptor.pk_field().to_string(),
                field: field.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_type() -> TypeDescriptor {
        TypeDescriptor::new("auth", "User")
    }

    #[test]
    fn descriptor_resolves_pk_alias() {
        let descriptor = user_type().with_pk_field("user_id");
        assert_eq!(descriptor.resolve_field("pk"), "user_id");
        assert_eq!(descriptor.resolve_field("username"), "username");
    }

    #[test]
    fn collection_iterates_references_in_order() {
        let collection = KeyOnlyCollection::new(user_type(), [3, 1, 2]);
        let keys: Vec<PrimaryKey> = collection.iter().map(|r| r.key().clone()).collect();
        assert_eq!(keys, vec![3.into(), 1.into(), 2.into()]);
        assert!(collection.iter().all(|r| r.descriptor() == &user_type()));
        assert_eq!(collection.all(), &collection);
    }

    #[test]
    fn values_list_only_projects_primary_key() {
        let collection = KeyOnlyCollection::new(user_type(), [1, 2]);
        assert_eq!(collection.values_list("id").unwrap().len(), 2);
        assert_eq!(collection.values_list("pk").unwrap().len(), 2);

        let err = collection.values_list("username").unwrap_err();
        assert!(matches!(err, FieldError::UnsupportedProjection { .. }));
    }

    #[test]
    fn empty_collection() {
        let collection = KeyOnlyCollection::new(user_type(), Vec::<i64>::new());
        assert!(collection.is_empty());
        assert_eq!(collection.iter().count(), 0);
    }
}

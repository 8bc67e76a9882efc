//! Plain data types shared by the cache engine and its callers.

pub mod error;
pub mod key;
pub mod record;
pub mod reference;
pub mod value;

pub use error::FieldError;
pub use key::{CascadeTarget, InstanceId, PrimaryKey};
pub use record::CachedRecord;
pub use reference::{KeyOnlyCollection, KeyOnlyReference, TypeDescriptor};
pub use value::{DecodedRepresentation, FieldValue, Representation};

//! Core type definitions for tandem.
//!
//! This crate defines the data model shared by both sides of a sync:
//! - [`FieldValue`]: the canonical tagged value both stores are read into
//! - [`FieldMap`] and [`FieldDiff`]: field sets and the minimal writes between them
//! - [`Identity`]: the hashable key that matches records to documents
//! - [`LocalRecord`] and [`RemoteDocument`]: one entry on each side
//!
//! Structural equality is defined once, in [`FieldValue`]'s `PartialEq`, and
//! every diff in the workspace goes through [`FieldDiff::between`].

mod fields;
mod identity;
mod record;
mod value;

pub use fields::{fields_equal, FieldDiff, FieldMap};
pub use identity::{Identity, MappingError};
pub use record::{LocalRecord, RecordId, RemoteDocument, ID_FIELD};
pub use value::FieldValue;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building typed values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

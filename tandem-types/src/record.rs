//! Local records and remote documents.

use crate::fields::FieldMap;
use crate::identity::{Identity, MappingError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved identity field of every remote document.
pub const ID_FIELD: &str = "_id";

/// Store-assigned handle of a local record.
///
/// This is the local store's own object handle, not the primary key: two
/// records can (incorrectly) share a primary key but never a `RecordId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entity instance in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: RecordId,
    pub fields: FieldMap,
}

impl LocalRecord {
    pub fn new(id: RecordId, fields: FieldMap) -> Self {
        Self { id, fields }
    }

    /// Identity of this record, read from its primary-key field.
    pub fn identity(&self, primary_key: &str) -> Result<Identity, MappingError> {
        Identity::from_value(primary_key, self.fields.get(primary_key))
    }
}

/// A document in the remote store.
///
/// The identity is validated on construction and `fields` always contains
/// [`ID_FIELD`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldMap", into = "FieldMap")]
pub struct RemoteDocument {
    id: Identity,
    fields: FieldMap,
}

impl RemoteDocument {
    /// Creates a document with the given identity and body.
    ///
    /// Any `_id` already in `fields` is overwritten.
    pub fn new(id: Identity, mut fields: FieldMap) -> Self {
        fields.insert(ID_FIELD, id.to_value());
        Self { id, fields }
    }

    /// Creates a document from a full field map, reading the identity from `_id`.
    pub fn from_fields(fields: FieldMap) -> Result<Self, MappingError> {
        let id = Identity::from_value(ID_FIELD, fields.get(ID_FIELD))?;
        Ok(Self { id, fields })
    }

    pub fn id(&self) -> &Identity {
        &self.id
    }

    /// All fields, including `_id`.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// All fields except `_id`.
    pub fn body(&self) -> FieldMap {
        let mut body = self.fields.clone();
        body.remove(ID_FIELD);
        body
    }

    pub fn get(&self, field: &str) -> Option<&crate::FieldValue> {
        self.fields.get(field)
    }

    /// Replaces the body, keeping the identity.
    pub fn set_body(&mut self, body: FieldMap) {
        self.fields = body;
        self.fields.insert(ID_FIELD, self.id.to_value());
    }
}

impl TryFrom<FieldMap> for RemoteDocument {
    type Error = MappingError;

    fn try_from(fields: FieldMap) -> Result<Self, Self::Error> {
        Self::from_fields(fields)
    }
}

impl From<RemoteDocument> for FieldMap {
    fn from(doc: RemoteDocument) -> Self {
        doc.fields
    }
}

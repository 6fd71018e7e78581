//! Record ⇄ document field conversion.
//!
//! A document carries every record field except the primary key, plus
//! `_id` holding the primary key's value. The adapter is stateless: the
//! same record or document always produces the same field map.

use tandem_types::{
    fields_equal, FieldDiff, FieldMap, FieldValue, Identity, LocalRecord, MappingError,
    RemoteDocument, ID_FIELD,
};

/// Converts between local records and remote documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAdapter {
    primary_key: String,
}

impl RecordAdapter {
    /// Creates an adapter for records keyed by `primary_key`.
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Identity of a local record.
    pub fn identity(&self, record: &LocalRecord) -> Result<Identity, MappingError> {
        record.identity(&self.primary_key)
    }

    /// Every record field except the primary key, plus `_id`.
    pub fn to_remote_fields(&self, record: &LocalRecord) -> Result<FieldMap, MappingError> {
        Ok(self.to_remote_document(record)?.fields().clone())
    }

    /// Every record field except the primary key, without `_id`.
    ///
    /// Used as the source side of field-level update diffs.
    pub fn to_remote_fields_without_id(&self, record: &LocalRecord) -> FieldMap {
        let mut fields = record.fields.clone();
        fields.remove(&self.primary_key);
        fields.remove(ID_FIELD);
        fields
    }

    /// The document a record is inserted as.
    pub fn to_remote_document(&self, record: &LocalRecord) -> Result<RemoteDocument, MappingError> {
        let identity = self.identity(record)?;
        Ok(RemoteDocument::new(
            identity,
            self.to_remote_fields_without_id(record),
        ))
    }

    /// A document's fields as the local record would hold them: `_id` is
    /// renamed to the primary key.
    pub fn to_local_fields(&self, document: &RemoteDocument) -> FieldMap {
        let mut fields = document.body();
        fields.insert(self.primary_key.clone(), document.id().to_value());
        fields
    }

    /// Writes each document field into `fields`, remapping `_id` to the
    /// primary key. Fields whose value already matches are not touched.
    pub fn apply_remote_fields(&self, document: &RemoteDocument, fields: &mut FieldMap) {
        for (field, value) in document.fields() {
            let target = if field == ID_FIELD {
                self.primary_key.as_str()
            } else {
                field.as_str()
            };
            if !fields_equal(fields.get(target), Some(value)) {
                fields.insert(target, value.clone());
            }
        }
    }

    /// Writes that bring `document` in line with `record`.
    pub fn local_to_remote_diff(&self, record: &LocalRecord, document: &RemoteDocument) -> FieldDiff {
        FieldDiff::between(&self.to_remote_fields_without_id(record), &document.body())
    }

    /// Writes that bring `record` in line with `document`.
    pub fn remote_to_local_diff(&self, document: &RemoteDocument, record: &LocalRecord) -> FieldDiff {
        FieldDiff::between(&self.to_local_fields(document), &record.fields)
    }

    /// Canonical value equality, with null and absent treated as equal.
    pub fn fields_equal(a: Option<&FieldValue>, b: Option<&FieldValue>) -> bool {
        fields_equal(a, b)
    }
}

//! Cross-store identities.
//!
//! A local record is matched to a remote document by comparing the record's
//! primary-key value with the document's `_id`. The two stores may represent
//! the same key differently (an integral float on one side, an integer on the
//! other), so both are mapped onto one hashable [`Identity`] first.

use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Comparable, hashable identity shared by a record and its document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identity {
    Int(i64),
    Str(String),
    Uuid(Uuid),
}

impl Identity {
    /// Maps a key value onto an identity.
    ///
    /// Strings and integers map directly, integral floats map to integers,
    /// and 16-byte values map to UUIDs. `field` only names the key in errors.
    pub fn from_value(field: &str, value: Option<&FieldValue>) -> Result<Self, MappingError> {
        let missing = || MappingError::MissingKey {
            field: field.to_string(),
        };
        let value = value.ok_or_else(missing)?;
        match value {
            FieldValue::Null => Err(missing()),
            FieldValue::String(s) => Ok(Self::Str(s.clone())),
            FieldValue::Int(i) => Ok(Self::Int(*i)),
            FieldValue::Float(_) => value.as_i64().map(Self::Int).ok_or_else(|| {
                MappingError::UnsupportedKey {
                    field: field.to_string(),
                    kind: "non-integral float",
                }
            }),
            FieldValue::Bytes(b) => Uuid::from_slice(b).map(Self::Uuid).map_err(|_| {
                MappingError::UnsupportedKey {
                    field: field.to_string(),
                    kind: "bytes",
                }
            }),
            other => Err(MappingError::UnsupportedKey {
                field: field.to_string(),
                kind: other.kind(),
            }),
        }
    }

    /// The field value written back into a store for this identity.
    pub fn to_value(&self) -> FieldValue {
        match self {
            Self::Int(i) => FieldValue::Int(*i),
            Self::Str(s) => FieldValue::String(s.clone()),
            Self::Uuid(u) => FieldValue::Bytes(u.as_bytes().to_vec()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Uuid> for Identity {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Errors raised while mapping keys onto identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The key field is absent or null.
    #[error("identity field `{field}` is missing")]
    MissingKey { field: String },

    /// The key field holds a value that cannot be an identity.
    #[error("identity field `{field}` has unsupported type {kind}")]
    UnsupportedKey { field: String, kind: &'static str },

    /// Two records (or two documents) carry the same identity.
    #[error("duplicate identity {0}")]
    DuplicateIdentity(Identity),
}

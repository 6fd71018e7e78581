//! Session configuration.

use serde::{Deserialize, Serialize};

/// What initial convergence does with records and documents that exist on
/// only one side.
///
/// Matched pairs always converge field-by-field from the local record to the
/// remote document; this only decides existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistencePolicy {
    /// Local existence is authoritative: unmatched remote documents are
    /// removed, unmatched local records are inserted remotely.
    #[default]
    LocalWins,
    /// Nothing is removed: unmatched remote documents are created locally,
    /// unmatched local records are inserted remotely.
    Union,
}

/// Configuration for one sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote collection name, carried in logs.
    pub collection: String,
    /// Local field holding the primary key. Mapped to and from `_id`.
    pub primary_key: String,
    /// Existence policy for initial convergence.
    pub existence_policy: ExistencePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: "records".to_string(),
            primary_key: "id".to_string(),
            existence_policy: ExistencePolicy::LocalWins,
        }
    }
}

impl SyncConfig {
    /// Creates a config for `collection` keyed by `primary_key`.
    pub fn new(collection: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            primary_key: primary_key.into(),
            ..Default::default()
        }
    }

    /// Builder-style existence policy override.
    pub fn with_existence_policy(mut self, policy: ExistencePolicy) -> Self {
        self.existence_policy = policy;
        self
    }
}

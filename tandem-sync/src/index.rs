//! Identity lookup over a read of the local store.

use std::collections::{BTreeMap, BTreeSet};
use tandem_types::{FieldDiff, Identity, LocalRecord, MappingError};

/// Result of looking an identity up.
#[derive(Debug, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a LocalRecord),
    Missing,
    /// More than one record carries this identity.
    Ambiguous,
}

/// Local records keyed by identity.
///
/// Records sharing an identity violate the one-record-per-identity
/// invariant; such identities are tracked as ambiguous and never resolve.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    records: BTreeMap<Identity, LocalRecord>,
    duplicates: BTreeSet<Identity>,
}

impl IdentityIndex {
    /// Builds an index, failing on the first unmappable or duplicate record.
    pub fn strict(records: Vec<LocalRecord>, primary_key: &str) -> Result<Self, MappingError> {
        let (index, mut errors) = Self::lenient(records, primary_key);
        if errors.is_empty() {
            Ok(index)
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Builds an index, collecting mapping errors instead of failing.
    ///
    /// Records without a usable key are left out; duplicated identities are
    /// reported once each and marked ambiguous.
    pub fn lenient(records: Vec<LocalRecord>, primary_key: &str) -> (Self, Vec<MappingError>) {
        let mut index = Self::default();
        let mut errors = Vec::new();
        for record in records {
            let identity = match record.identity(primary_key) {
                Ok(identity) => identity,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if index.duplicates.contains(&identity) {
                continue;
            }
            if index.records.remove(&identity).is_some() {
                errors.push(MappingError::DuplicateIdentity(identity.clone()));
                index.duplicates.insert(identity);
                continue;
            }
            index.records.insert(identity, record);
        }
        (index, errors)
    }

    /// Resolves `identity` to its record, if exactly one carries it.
    pub fn lookup(&self, identity: &Identity) -> Lookup<'_> {
        if self.duplicates.contains(identity) {
            return Lookup::Ambiguous;
        }
        match self.records.get(identity) {
            Some(record) => Lookup::Found(record),
            None => Lookup::Missing,
        }
    }

    /// Whether any record, ambiguous or not, carries `identity`.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.contains_key(identity) || self.duplicates.contains(identity)
    }

    /// Adds a record created while the index is in use.
    pub fn insert(&mut self, identity: Identity, record: LocalRecord) {
        self.records.insert(identity, record);
    }

    /// Mirrors a staged update so later lookups in the same batch see it.
    pub fn apply(&mut self, identity: &Identity, diff: &FieldDiff) {
        if let Some(record) = self.records.get_mut(identity) {
            diff.apply_to(&mut record.fields);
        }
    }

    /// Drops a record deleted while the index is in use.
    pub fn remove(&mut self, identity: &Identity) -> Option<LocalRecord> {
        self.records.remove(identity)
    }

    /// Unambiguous records in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &LocalRecord)> {
        self.records.iter()
    }

    /// Number of unambiguous records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no unambiguous record is indexed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! Field maps and field-level diffs.

use crate::value::FieldValue;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// An unordered set of named field values.
///
/// Backed by a `BTreeMap` so iteration (and therefore every write the
/// engine issues) happens in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, FieldValue>);

impl FieldMap {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a field map from a JSON object.
    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from(v)))
                .collect()),
            other => Err(Error::NotAnObject(FieldValue::from(other).kind())),
        }
    }

    /// Parses a field map from a JSON object string.
    pub fn parse(json: &str) -> crate::Result<Self> {
        Self::from_json(serde_json::from_str(json)?)
    }

    /// Converts into a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Returns the raw value stored under `field`, including explicit nulls.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Returns the value under `field`, treating an explicit null as absent.
    pub fn get_present(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(field.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.remove(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// Field-by-field equality where null and absent are the same.
    pub fn equivalent(&self, other: &FieldMap) -> bool {
        FieldDiff::between(self, other).is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, FieldValue);
    type IntoIter = btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Compares two optional field values, treating null and absent as equal.
pub fn fields_equal(a: Option<&FieldValue>, b: Option<&FieldValue>) -> bool {
    match (a.filter(|v| !v.is_null()), b.filter(|v| !v.is_null())) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// The minimal set of field writes that turns one field map into another.
///
/// An empty diff means the destination already matches and no write should
/// be issued at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    set: BTreeMap<String, FieldValue>,
    remove: BTreeSet<String>,
}

impl FieldDiff {
    /// Creates an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the writes that make `destination` match `source`.
    ///
    /// Fields present in `destination` but absent (or null) in `source` are
    /// removed; fields whose values differ are set; equal fields are left
    /// out entirely.
    pub fn between(source: &FieldMap, destination: &FieldMap) -> Self {
        let mut diff = Self::new();
        for (field, value) in source.iter() {
            if !fields_equal(Some(value), destination.get(field)) {
                if value.is_null() {
                    diff.remove.insert(field.clone());
                } else {
                    diff.set.insert(field.clone(), value.clone());
                }
            }
        }
        for (field, value) in destination.iter() {
            if !source.contains(field) && !value.is_null() {
                diff.remove.insert(field.clone());
            }
        }
        diff
    }

    /// Adds a field assignment.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let field = field.into();
        self.remove.remove(&field);
        self.set.insert(field, value.into());
        self
    }

    /// Adds a field removal.
    pub fn remove(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.set.remove(&field);
        self.remove.insert(field);
        self
    }

    /// Drops any operation touching `field`.
    pub fn without(mut self, field: &str) -> Self {
        self.set.remove(field);
        self.remove.remove(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Number of field-level operations in the diff.
    pub fn len(&self) -> usize {
        self.set.len() + self.remove.len()
    }

    pub fn sets(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.set.iter()
    }

    pub fn removals(&self) -> impl Iterator<Item = &String> {
        self.remove.iter()
    }

    /// Applies the diff in place.
    pub fn apply_to(&self, fields: &mut FieldMap) {
        for field in &self.remove {
            fields.remove(field);
        }
        for (field, value) in &self.set {
            fields.insert(field.clone(), value.clone());
        }
    }
}

//! Association values and the per-instance association set

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A `(key, value)` pair correlating events to saga instances.
///
/// Equality, hashing and ordering all cover both fields, so the ordering is
/// consistent with equality and sorted containers are safe to use.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationValue {
    key: Box<str>,
    value: Box<str>,
}

impl AssociationValue {
    /// Create an association value
    pub fn new(key: impl Into<Box<str>>, value: impl Into<Box<str>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The association key (e.g. `"orderId"`)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The correlated value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for AssociationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// The associations held by one saga instance. Never holds duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSet {
    values: BTreeSet<AssociationValue>,
}

impl AssociationSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value. Returns `false` if it was already present.
    pub fn add(&mut self, value: AssociationValue) -> bool {
        self.values.insert(value)
    }

    /// Remove a value. Returns `false` if it was not present.
    pub fn remove(&mut self, value: &AssociationValue) -> bool {
        self.values.remove(value)
    }

    /// Check membership
    pub fn contains(&self, value: &AssociationValue) -> bool {
        self.values.contains(value)
    }

    /// Number of associations
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in `(key, value)` order
    pub fn iter(&self) -> impl Iterator<Item = &AssociationValue> {
        self.values.iter()
    }

    /// Drop every association, returning what was held
    pub fn drain(&mut self) -> Vec<AssociationValue> {
        std::mem::take(&mut self.values).into_iter().collect()
    }
}

impl FromIterator<AssociationValue> for AssociationSet {
    fn from_iter<I: IntoIterator<Item = AssociationValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AssociationSet {
    type Item = &'a AssociationValue;
    type IntoIter = std::collections::btree_set::Iter<'a, AssociationValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

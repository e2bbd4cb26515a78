//! Membership types shared by every store backend.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StoreError;

// =============================================================================
// Group Set
// =============================================================================

/// An unordered set of group names.
///
/// The provider does not guarantee unique group names, so duplicates collapse
/// on construction. Iteration order is lexicographic, which keeps stored and
/// rendered output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupSet(BTreeSet<String>);

impl GroupSet {
    /// Creates an empty group set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns `true` if the set contains the given group.
    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.0.contains(group)
    }

    /// Adds a group. Returns `false` if it was already present.
    pub fn insert(&mut self, group: impl Into<String>) -> bool {
        self.0.insert(group.into())
    }

    /// Number of distinct groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the principal belongs to no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates group names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the groups as a sorted vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for GroupSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for GroupSet {
    fn from(groups: Vec<String>) -> Self {
        groups.into_iter().collect()
    }
}

impl IntoIterator for GroupSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a GroupSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for GroupSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for group in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(group)?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// Membership Entry
// =============================================================================

/// A stored membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEntry {
    /// Principal identifier (username). Unique key.
    pub principal: String,

    /// Groups from the most recent successful write.
    pub groups: GroupSet,

    /// When the entry was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MembershipEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(principal: impl Into<String>, groups: GroupSet) -> Self {
        Self {
            principal: principal.into(),
            groups,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Trims a principal identifier and rejects blank input.
///
/// # Errors
///
/// Returns `StoreError::InvalidInput` if the identifier is empty after trimming.
pub fn normalize_principal(principal: &str) -> Result<&str, StoreError> {
    let trimmed = principal.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid_input("principal must not be empty"));
    }
    Ok(trimmed)
}

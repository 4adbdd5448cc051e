//! In-memory ledger value.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scanner::{Fingerprint, RelativePath};

/// Mapping from relative path to the most recently observed fingerprint.
///
/// Holds at most one fingerprint per path. Serializes as a flat JSON object
/// of `"relative/path": "<64 hex chars>"`, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<RelativePath, Fingerprint>,
}

impl Ledger {
    /// An empty ledger (first run).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known fingerprint for a path.
    #[must_use]
    pub fn get(&self, path: &RelativePath) -> Option<&Fingerprint> {
        self.entries.get(path)
    }

    /// Record the fingerprint for a path, returning the one it replaced.
    pub fn insert(&mut self, path: RelativePath, fingerprint: Fingerprint) -> Option<Fingerprint> {
        self.entries.insert(path, fingerprint)
    }

    /// Whether the ledger knows a path.
    #[must_use]
    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of tracked paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> btree_map::Iter<'_, RelativePath, Fingerprint> {
        self.entries.iter()
    }
}

impl FromIterator<(RelativePath, Fingerprint)> for Ledger {
    fn from_iter<I: IntoIterator<Item = (RelativePath, Fingerprint)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = (&'a RelativePath, &'a Fingerprint);
    type IntoIter = btree_map::Iter<'a, RelativePath, Fingerprint>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

//! Quality label → stream URL map

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::models::quality::{canonical, collapse};

/// Ordered mapping of quality label to stream URL.
///
/// Labels are normalised on insert and the first URL for a label wins.
/// Insertion order is kept so "first available" is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMap {
    entries: Vec<(String, String)>,
}

impl StreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the label is already present. Returns whether it was added.
    pub fn insert(&mut self, label: &str, url: &str) -> bool {
        let label = collapse(label);
        if label.is_empty() || url.is_empty() || self.contains(&label) {
            return false;
        }
        self.entries.push((label, url.to_string()));
        true
    }

    /// Insert under `base`, or `base_2`, `base_3`, ... if taken.
    /// A URL already present under any label, or an empty one, is skipped.
    pub fn insert_synthetic(&mut self, base: &str, url: &str) -> bool {
        if url.trim().is_empty() || collapse(base).is_empty() {
            return false;
        }
        if self.entries.iter().any(|(_, u)| u == url) {
            return false;
        }
        if self.insert(base, url) {
            return true;
        }
        let mut n = 2;
        while !self.insert(&format!("{}_{}", base, n), url) {
            n += 1;
        }
        true
    }

    /// Add every entry of `other` whose label is not yet present.
    pub fn merge(&mut self, other: StreamMap) {
        for (label, url) in other.entries {
            self.insert(&label, &url);
        }
    }

    /// Exact lookup after case/whitespace normalisation.
    pub fn get(&self, label: &str) -> Option<&str> {
        let label = collapse(label);
        self.entries
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, u)| u.as_str())
    }

    /// Lookup treating `"720"` and `"720p"` as the same label.
    /// Returns the label as stored.
    pub fn find_equivalent(&self, label: &str) -> Option<(&str, &str)> {
        let exact = collapse(label);
        let wanted = canonical(label);
        self.entries
            .iter()
            .find(|(l, _)| *l == exact)
            .or_else(|| self.entries.iter().find(|(l, _)| canonical(l) == wanted))
            .map(|(l, u)| (l.as_str(), u.as_str()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn first(&self) -> Option<(&str, &str)> {
        self.entries.first().map(|(l, u)| (l.as_str(), u.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, u)| (l.as_str(), u.as_str()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for StreamMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (label, url) in iter {
            map.insert(label, url);
        }
        map
    }
}

impl Serialize for StreamMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, url) in &self.entries {
            map.serialize_entry(label, url)?;
        }
        map.end()
    }
}

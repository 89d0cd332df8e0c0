//! Per-file marker record.

use std::collections::HashMap;

use crate::types::MarkerValue;

/// The complete, current qualified-name → marker-value mapping of one file.
///
/// Always produced by a full re-scan of the file and stored wholesale; never
/// patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerRecord {
    entries: HashMap<String, MarkerValue>,
}

impl MarkerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, qualified_name: impl Into<String>, value: impl Into<MarkerValue>) {
        self.entries.insert(qualified_name.into(), value.into());
    }

    pub fn get(&self, qualified_name: &str) -> Option<&MarkerValue> {
        self.entries.get(qualified_name)
    }

    pub fn contains_value(&self, value: &str) -> bool {
        self.entries.values().any(|v| v == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MarkerValue)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &MarkerValue> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MarkerRecord
where
    K: Into<String>,
    V: Into<MarkerValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

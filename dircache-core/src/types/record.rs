//! Directory lookup result record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::ERROR_ATTRIBUTE;

/// Attributes returned by a directory lookup, keyed by attribute name.
///
/// The cache treats records as opaque values. Multi-valued directory
/// attributes are flattened into a single string by the directory client
/// before they reach this type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRecord {
    attributes: BTreeMap<String, String>,
}

impl ResultRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Creates a record carrying only an error marker attribute.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new().with(ERROR_ATTRIBUTE, message)
    }

    /// Inserts or replaces an attribute, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Returns an attribute value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns true if the record carries an error marker.
    pub fn has_error(&self) -> bool {
        self.attributes.contains_key(ERROR_ATTRIBUTE)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if the record has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for ResultRecord {
    fn from(attributes: BTreeMap<String, String>) -> Self {
        Self { attributes }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResultRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

//! Record identifier and record types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable record identifier, unique across the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sort direction of the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// A record is the atomic unit of data shown in a list row.
///
/// Attribute maps are compared attribute-for-attribute when deciding
/// whether a collection resync changed anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier within the collection.
    pub id: RecordId,

    /// Entity type the record belongs to (e.g. "Account").
    #[serde(rename = "entityType")]
    pub entity_type: String,

    /// Attribute values keyed by attribute name.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Create a record with no attributes.
    pub fn new(id: impl Into<RecordId>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_ordering_is_lexicographic() {
        let mut ids: Vec<RecordId> = vec!["c".into(), "a".into(), "b".into()];
        ids.sort();
        assert_eq!(ids, vec![RecordId::from("a"), "b".into(), "c".into()]);
    }

    #[test]
    fn test_record_serializes_id_transparently() {
        let record = Record::new("r1", "Account").with_attribute("name", "Acme".into());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "r1");
        assert_eq!(json["entityType"], "Account");
        assert_eq!(json["attributes"]["name"], "Acme");
    }
}

//! JSON-backed metadata.

use parking_lot::RwLock;

use crate::ports::MetadataOracle;

/// Metadata held as one JSON document, addressed by key path.
pub struct JsonMetadata {
    document: RwLock<serde_json::Value>,
}

impl JsonMetadata {
    pub fn new(document: serde_json::Value) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    /// Set a value at `path`, creating intermediate objects.
    pub fn set(&self, path: &[&str], value: serde_json::Value) {
        let mut document = self.document.write();
        let mut node = &mut *document;
        for key in path {
            if !node.is_object() {
                *node = serde_json::Value::Object(serde_json::Map::new());
            }
            node = match node {
                serde_json::Value::Object(map) => map
                    .entry(key.to_string())
                    .or_insert(serde_json::Value::Null),
                _ => return,
            };
        }
        *node = value;
    }
}

impl MetadataOracle for JsonMetadata {
    fn get(&self, path: &[&str]) -> Option<serde_json::Value> {
        let document = self.document.read();
        let mut node = &*document;
        for key in path {
            node = node.get(key)?;
        }
        if node.is_null() {
            None
        } else {
            Some(node.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_lookup() {
        let metadata = JsonMetadata::new(json!({
            "clientDefs": {"Account": {"massActionList": ["sendEmail", 3], "mergeDisabled": true}},
            "scopes": {"Account": {"stream": 1}}
        }));

        assert_eq!(
            metadata.get_str_list(&["clientDefs", "Account", "massActionList"]),
            vec!["sendEmail".to_string()]
        );
        assert!(metadata.get_bool(&["clientDefs", "Account", "mergeDisabled"]));
        assert!(metadata.get_bool(&["scopes", "Account", "stream"]));
        assert!(!metadata.get_bool(&["scopes", "Contact", "stream"]));
        assert!(metadata.get(&["clientDefs", "Lead"]).is_none());
    }

    #[test]
    fn test_set_creates_path() {
        let metadata = JsonMetadata::new(json!({}));
        metadata.set(&["formula", "Account", "beforeSaveCustomScript"], json!("x = 1;"));

        assert_eq!(
            metadata.get_str(&["formula", "Account", "beforeSaveCustomScript"]),
            Some("x = 1;".to_string())
        );
    }
}

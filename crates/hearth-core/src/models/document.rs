//! Remote document model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document as stored in the remote document store and mirrored locally.
///
/// Every document carries an `id` and a last-write-wins `updatedAt` timestamp;
/// all remaining fields are application data and flow through untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier, unique within its collection.
    pub id: String,
    /// Last modification timestamp (Unix ms), used for conflict detection.
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
    /// Remaining application fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document with the given id, stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            updated_at: chrono::Utc::now().timestamp_millis(),
            fields,
        }
    }

    /// Create a document with an explicit modification timestamp.
    #[must_use]
    pub fn with_timestamp(
        id: impl Into<String>,
        updated_at: i64,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            updated_at,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_updated_at_in_camel_case_and_flattens_fields() {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String("Olive oil".to_string()));

        let doc = Document::with_timestamp("item-1", 1700000000000, fields);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["id"], "item-1");
        assert_eq!(json["updatedAt"], 1700000000000_i64);
        assert_eq!(json["name"], "Olive oil");
    }

    #[test]
    fn deserializes_missing_updated_at_to_zero() {
        let doc: Document = serde_json::from_str(r#"{"id":"x","name":"rice"}"#).unwrap();
        assert_eq!(doc.updated_at, 0);
        assert_eq!(doc.fields["name"], "rice");
    }
}

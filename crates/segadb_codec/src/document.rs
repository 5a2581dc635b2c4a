//! Serde types for the canonical `.segadb` document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered column-to-value mapping of a single record.
///
/// `serde_json`'s `preserve_order` feature keeps keys in insertion order, so
/// a record round-trips with its columns in the order they were written.
pub type ColumnData = serde_json::Map<String, serde_json::Value>;

/// The whole-database document: the pivot for compression and encryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDocument {
    /// Database name.
    pub name: String,
    /// Tables keyed by name.
    pub tables: BTreeMap<String, TableDocument>,
}

/// One table's slice of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    /// Table name (repeated inside the slice so a slice is self-describing).
    pub name: String,
    /// Ordered column names.
    pub columns: Vec<String>,
    /// All live records, in table order.
    pub records: Vec<RecordDocument>,
    /// Next id to assign; monotonically increasing, never reused.
    pub next_id: u64,
    /// Per-column constraint descriptors.
    #[serde(default)]
    pub constraints: BTreeMap<String, Vec<ConstraintDocument>>,
}

/// A single record: integer id plus its attribute dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    /// Record id, unique within its table.
    pub id: u64,
    /// Column values.
    pub data: ColumnData,
}

/// Serializable form of a column constraint.
///
/// Predicate constraints carry only a registry name: constraint bodies are
/// never stored as executable source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintDocument {
    /// Column values must be unique across the table.
    Unique,
    /// Column values must exist in the referenced table's column.
    ForeignKey {
        /// Name of the referenced table.
        reference_table: String,
        /// Name of the referenced column.
        reference_column: String,
    },
    /// Named predicate, resolved against a registry on load.
    Predicate {
        /// Registry name of the predicate.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_table() -> TableDocument {
        let mut data = ColumnData::new();
        data.insert("name".into(), json!("A"));
        data.insert("email".into(), json!("a@x.com"));

        let mut constraints = BTreeMap::new();
        constraints.insert("email".to_string(), vec![ConstraintDocument::Unique]);

        TableDocument {
            name: "users".into(),
            columns: vec!["name".into(), "email".into()],
            records: vec![RecordDocument { id: 1, data }],
            next_id: 2,
            constraints,
        }
    }

    #[test]
    fn document_json_shape() {
        let mut tables = BTreeMap::new();
        tables.insert("users".to_string(), sample_table());
        let doc = DatabaseDocument {
            name: "test".into(),
            tables,
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["name"], "test");
        assert_eq!(value["tables"]["users"]["next_id"], 2);
        assert_eq!(value["tables"]["users"]["records"][0]["id"], 1);
        assert_eq!(
            value["tables"]["users"]["constraints"]["email"][0]["type"],
            "unique"
        );
    }

    #[test]
    fn constraint_tags() {
        let fk = ConstraintDocument::ForeignKey {
            reference_table: "users".into(),
            reference_column: "user_id".into(),
        };
        let value = serde_json::to_value(&fk).unwrap();
        assert_eq!(value["type"], "foreign_key");
        assert_eq!(value["reference_table"], "users");

        let parsed: ConstraintDocument =
            serde_json::from_value(json!({"type": "predicate", "name": "positive"})).unwrap();
        assert_eq!(
            parsed,
            ConstraintDocument::Predicate {
                name: "positive".into()
            }
        );
    }

    #[test]
    fn record_data_preserves_column_order() {
        let mut data = ColumnData::new();
        data.insert("z".into(), json!(1));
        data.insert("a".into(), json!(2));
        let text = serde_json::to_string(&RecordDocument { id: 1, data }).unwrap();
        assert!(text.find("\"z\"").unwrap() < text.find("\"a\"").unwrap());
    }

    #[test]
    fn missing_constraints_default_to_empty() {
        let parsed: TableDocument = serde_json::from_value(json!({
            "name": "t",
            "columns": ["a"],
            "records": [],
            "next_id": 1
        }))
        .unwrap();
        assert!(parsed.constraints.is_empty());
    }
}

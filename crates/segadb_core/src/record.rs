//! Records: an integer identity plus a mutable attribute dictionary.

use serde_json::Value;

/// Record identifier, unique within a table and never reused.
pub type RecordId = u64;

/// A record's attribute dictionary, in column order.
pub type RecordData = serde_json::Map<String, Value>;

/// A single table row.
///
/// Records are owned exclusively by their table: they are created on insert,
/// mutated in place on update, and removed on delete. The table keeps every
/// index consistent with the record's current data.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    pub(crate) data: RecordData,
}

impl Record {
    /// Creates a record with the given id and data.
    #[must_use]
    pub fn new(id: RecordId, data: RecordData) -> Self {
        Self { id, data }
    }

    /// Returns the record id.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the attribute dictionary.
    #[must_use]
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Returns the value of a column, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    /// Returns a copy of a column's value, treating absence as JSON null.
    #[must_use]
    pub fn get_or_null(&self, column: &str) -> Value {
        self.data.get(column).cloned().unwrap_or(Value::Null)
    }
}

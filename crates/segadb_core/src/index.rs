//! Per-column value index.

use crate::record::{Record, RecordId};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Canonical lookup key for a JSON value.
///
/// `serde_json::Value` is neither `Hash` nor `Ord`, so indexes key on the
/// value's canonical JSON text. Distinct JSON encodings (`1` vs `1.0`) are
/// distinct keys.
#[must_use]
pub fn value_key(value: &Value) -> String {
    value.to_string()
}

/// A multimap from a column value to the set of record ids holding it.
///
/// One `Index` instance exists per indexed column, owned by the table and
/// updated incrementally: insert adds the record id under its column value,
/// update moves it from the old value's set to the new, delete removes it.
/// After any sequence of mutations, `find(v)` returns exactly the ids of
/// live records whose column value equals `v`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: HashMap<String, BTreeSet<RecordId>>,
    count: usize,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record id under the given column value.
    pub fn add(&mut self, value: &Value, id: RecordId) {
        let set = self.entries.entry(value_key(value)).or_default();
        if set.insert(id) {
            self.count += 1;
        }
    }

    /// Removes a record id from the given column value's set.
    ///
    /// Empty sets are dropped so no stale keys linger. Returns whether the
    /// entry existed.
    pub fn remove(&mut self, value: &Value, id: RecordId) -> bool {
        let key = value_key(value);
        if let Some(set) = self.entries.get_mut(&key) {
            if set.remove(&id) {
                self.count -= 1;
                if set.is_empty() {
                    self.entries.remove(&key);
                }
                return true;
            }
        }
        false
    }

    /// Returns the ids of records holding the given value, in ascending order.
    #[must_use]
    pub fn find(&self, value: &Value) -> Vec<RecordId> {
        match self.entries.get(&value_key(value)) {
            Some(set) => set.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Returns whether any record holds the given value.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.entries.contains_key(&value_key(value))
    }

    /// Returns whether a record other than `exclude` holds the given value.
    #[must_use]
    pub fn contains_other(&self, value: &Value, exclude: RecordId) -> bool {
        match self.entries.get(&value_key(value)) {
            Some(set) => set.iter().any(|id| *id != exclude),
            None => false,
        }
    }

    /// Total number of (value, id) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns whether the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Clears all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }

    /// Rebuilds the index for `column` from a full record scan.
    pub fn rebuild(&mut self, column: &str, records: &[Record]) {
        self.clear();
        for record in records {
            self.add(&record.get_or_null(column), record.id());
        }
    }
}

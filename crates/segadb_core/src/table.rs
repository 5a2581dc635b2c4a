//! In-memory tables: typed-by-convention record collections with
//! constraints, secondary indexes, and relational-style derivations.

use crate::constraint::Constraint;
use crate::error::{DbError, DbResult};
use crate::index::{value_key, Index};
use crate::record::{Record, RecordData, RecordId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Aggregation operator for [`Table::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    /// Smallest value in the group.
    Min,
    /// Largest value in the group.
    Max,
    /// Number of rows in the group.
    Count,
    /// Numeric sum over the group.
    Sum,
    /// Numeric mean over the group.
    Avg,
    /// Number of distinct values in the group.
    CountDistinct,
}

impl AggregateFn {
    fn suffix(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::CountDistinct => "count_distinct",
        }
    }
}

/// A named collection of records sharing a declared column list.
///
/// Columns are by convention; a record may omit columns or carry extras.
/// Constraints and indexes are keyed by column name and maintained through
/// every mutation.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    records: Vec<Record>,
    next_id: RecordId,
    constraints: BTreeMap<String, Vec<Constraint>>,
    indexes: BTreeMap<String, Index>,
}

impl Table {
    /// Creates an empty table with the given column list.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            records: Vec::new(),
            next_id: 1,
            constraints: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Rebuilds a table from persisted parts. Indexes are not restored;
    /// callers recreate them as needed.
    pub(crate) fn from_parts(
        name: String,
        columns: Vec<String>,
        records: Vec<Record>,
        next_id: RecordId,
        constraints: BTreeMap<String, Vec<Constraint>>,
    ) -> Self {
        Self {
            name,
            columns,
            records,
            next_id,
            constraints,
            indexes: BTreeMap::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns, in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All records, in insertion order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The id the next auto-assigned insert will use.
    #[must_use]
    pub fn next_id(&self) -> RecordId {
        self.next_id
    }

    /// Constraints per column.
    #[must_use]
    pub fn constraints(&self) -> &BTreeMap<String, Vec<Constraint>> {
        &self.constraints
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Whether a record with this id exists.
    #[must_use]
    pub fn contains_id(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    // ---- constraints ----

    /// Attaches a constraint to a declared column.
    ///
    /// Foreign-key reference validity is the caller's concern; this only
    /// checks that the column itself is declared.
    pub fn add_constraint(&mut self, column: &str, constraint: Constraint) -> DbResult<()> {
        if !self.columns.iter().any(|c| c == column) {
            return Err(DbError::column_not_found(&self.name, column));
        }
        self.constraints
            .entry(column.to_string())
            .or_default()
            .push(constraint);
        Ok(())
    }

    /// Checks every non-foreign-key constraint against candidate data.
    ///
    /// `exclude` skips one record id when checking uniqueness, so an update
    /// does not collide with the record being updated.
    pub(crate) fn check_constraints(
        &self,
        data: &RecordData,
        exclude: Option<RecordId>,
    ) -> DbResult<()> {
        for (column, constraints) in &self.constraints {
            let value = data.get(column).cloned().unwrap_or(Value::Null);
            self.check_column(column, &value, constraints, exclude)?;
        }
        Ok(())
    }

    /// Checks constraints for a specific set of columns only.
    pub(crate) fn check_columns(
        &self,
        data: &RecordData,
        columns: &BTreeSet<String>,
        exclude: Option<RecordId>,
    ) -> DbResult<()> {
        for column in columns {
            if let Some(constraints) = self.constraints.get(column) {
                let value = data.get(column).cloned().unwrap_or(Value::Null);
                self.check_column(column, &value, constraints, exclude)?;
            }
        }
        Ok(())
    }

    fn check_column(
        &self,
        column: &str,
        value: &Value,
        constraints: &[Constraint],
        exclude: Option<RecordId>,
    ) -> DbResult<()> {
        for constraint in constraints {
            match constraint {
                Constraint::Unique => {
                    let clash = if let Some(index) = self.indexes.get(column) {
                        match exclude {
                            Some(id) => index.contains_other(value, id),
                            None => index.contains(value),
                        }
                    } else {
                        self.records.iter().any(|r| {
                            exclude != Some(r.id()) && r.get_or_null(column) == *value
                        })
                    };
                    if clash {
                        return Err(DbError::constraint_violation(column, value, "unique"));
                    }
                }
                // Resolved by the database layer, which can see siblings.
                Constraint::ForeignKey { .. } => {}
                Constraint::Predicate { name, check } => {
                    if !check(value) {
                        return Err(DbError::constraint_violation(column, value, name));
                    }
                }
            }
        }
        Ok(())
    }

    // ---- indexes ----

    /// Builds (or rebuilds) a secondary index on a declared column.
    pub fn create_index(&mut self, column: &str) -> DbResult<()> {
        if !self.columns.iter().any(|c| c == column) {
            return Err(DbError::column_not_found(&self.name, column));
        }
        let mut index = Index::new();
        index.rebuild(column, &self.records);
        self.indexes.insert(column.to_string(), index);
        Ok(())
    }

    /// Removes the index on a column, if one exists.
    pub fn drop_index(&mut self, column: &str) {
        self.indexes.remove(column);
    }

    /// The index on a column, if one exists.
    #[must_use]
    pub fn index(&self, column: &str) -> Option<&Index> {
        self.indexes.get(column)
    }

    /// Columns that currently carry an index.
    #[must_use]
    pub fn indexed_columns(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }

    fn index_insert(&mut self, record_index: usize) {
        let record = &self.records[record_index];
        let id = record.id();
        let values: Vec<(String, Value)> = self
            .indexes
            .keys()
            .map(|col| (col.clone(), record.get_or_null(col)))
            .collect();
        for (col, value) in values {
            if let Some(index) = self.indexes.get_mut(&col) {
                index.add(&value, id);
            }
        }
    }

    fn index_remove(&mut self, record: &Record) {
        for (col, index) in &mut self.indexes {
            index.remove(&record.get_or_null(col), record.id());
        }
    }

    // ---- mutation ----

    /// Inserts a record, erroring on an explicit duplicate id.
    ///
    /// When `data` carries an unsigned-integer `"id"` key, that id is used
    /// (and the key stripped from the stored data); otherwise the next
    /// sequential id is assigned. Returns the id actually used.
    pub fn insert(&mut self, data: RecordData) -> DbResult<RecordId> {
        self.insert_with(data, false)
    }

    /// Inserts a record; with `flex_ids`, an explicit duplicate id is
    /// remapped to `max(next_id, id) + 1` instead of erroring.
    pub fn insert_with(&mut self, mut data: RecordData, flex_ids: bool) -> DbResult<RecordId> {
        self.check_constraints(&data, None)?;

        let explicit = data.get("id").and_then(Value::as_u64);
        let id = match explicit {
            Some(requested) => {
                data.shift_remove("id");
                if self.contains_id(requested) {
                    if flex_ids {
                        // next_id is already one past the highest id seen
                        self.next_id
                    } else {
                        return Err(DbError::DuplicateId { id: requested });
                    }
                } else {
                    requested
                }
            }
            None => self.next_id,
        };

        self.records.push(Record::new(id, data));
        self.index_insert(self.records.len() - 1);

        self.next_id = match explicit {
            Some(_) => self.next_id.max(id.saturating_add(1)),
            None => self.next_id + 1,
        };
        Ok(id)
    }

    /// Inserts a record, discarding it on any failure.
    ///
    /// Returns the new id on success and `None` when a constraint or id
    /// check rejected the data. The failure is logged, not propagated.
    pub fn try_insert(&mut self, data: RecordData) -> Option<RecordId> {
        match self.insert(data) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(table = %self.name, error = %err, "insert rejected");
                None
            }
        }
    }

    /// Inserts a batch atomically: either every record lands or none do.
    ///
    /// Explicit `"id"` keys in batch data are ignored; ids are assigned
    /// sequentially. Uniqueness is checked against the table and against
    /// earlier rows of the same batch.
    pub fn bulk_insert(&mut self, batch: Vec<RecordData>) -> DbResult<Vec<RecordId>> {
        // Validate the whole batch before touching the table.
        let unique_columns: Vec<String> = self
            .constraints
            .iter()
            .filter(|(_, cs)| cs.iter().any(|c| matches!(c, Constraint::Unique)))
            .map(|(col, _)| col.clone())
            .collect();
        let mut seen: BTreeMap<String, HashSet<String>> = unique_columns
            .iter()
            .map(|c| (c.clone(), HashSet::new()))
            .collect();

        for data in &batch {
            self.check_constraints(data, None)?;
            for column in &unique_columns {
                let value = data.get(column).cloned().unwrap_or(Value::Null);
                let key = value_key(&value);
                let keys = seen
                    .get_mut(column)
                    .unwrap_or_else(|| unreachable!("seeded above"));
                if !keys.insert(key) {
                    return Err(DbError::constraint_violation(column, &value, "unique"));
                }
            }
        }

        let mut ids = Vec::with_capacity(batch.len());
        for mut data in batch {
            data.shift_remove("id");
            let id = self.next_id;
            self.records.push(Record::new(id, data));
            self.index_insert(self.records.len() - 1);
            self.next_id += 1;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Deletes a record by id.
    pub fn delete(&mut self, id: RecordId) -> DbResult<()> {
        let position = self
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or(DbError::RecordNotFound { id })?;
        let record = self.records.remove(position);
        self.index_remove(&record);
        Ok(())
    }

    /// Replaces a record's data wholesale.
    ///
    /// Only the columns whose values actually change are constraint-checked
    /// and re-indexed. A column present before but absent in `data` is
    /// treated as changing to null.
    pub fn update(&mut self, id: RecordId, mut data: RecordData) -> DbResult<()> {
        data.shift_remove("id");
        let position = self
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or(DbError::RecordNotFound { id })?;

        let old = self.records[position].data().clone();
        let mut changed: BTreeSet<String> = BTreeSet::new();
        for (key, value) in &data {
            if old.get(key) != Some(value) {
                changed.insert(key.clone());
            }
        }
        for key in old.keys() {
            if !data.contains_key(key) {
                changed.insert(key.clone());
            }
        }

        self.check_columns(&data, &changed, Some(id))?;

        for column in &changed {
            if let Some(index) = self.indexes.get_mut(column) {
                index.remove(old.get(column).unwrap_or(&Value::Null), id);
                index.add(data.get(column).unwrap_or(&Value::Null), id);
            }
        }
        self.records[position].data = data;
        Ok(())
    }

    // ---- queries ----

    /// Records matching a predicate, in insertion order.
    pub fn select<F>(&self, predicate: F) -> Vec<&Record>
    where
        F: Fn(&Record) -> bool,
    {
        self.records.iter().filter(|r| predicate(r)).collect()
    }

    /// A new table holding copies of the matching records, with fresh ids.
    pub fn filter<F>(&self, predicate: F) -> DbResult<Table>
    where
        F: Fn(&Record) -> bool,
    {
        let mut out = Table::new(format!("{}_filtered", self.name), self.columns.clone());
        for record in self.records.iter().filter(|r| predicate(r)) {
            out.insert(record.data().clone())?;
        }
        Ok(out)
    }

    /// First record id whose column equals the value, using the column's
    /// index when one exists.
    #[must_use]
    pub fn get_id_by_column(&self, column: &str, value: &Value) -> Option<RecordId> {
        if let Some(index) = self.indexes.get(column) {
            return index.find(value).first().copied();
        }
        self.records
            .iter()
            .find(|r| r.get_or_null(column) == *value)
            .map(Record::id)
    }

    /// Inner join on `self.on == other.other_on`.
    ///
    /// Result columns are this table's columns followed by the other's;
    /// a colliding column name from the other table is suffixed with
    /// `_<other_table_name>`.
    pub fn join(&self, other: &Table, on: &str, other_on: &str) -> DbResult<Table> {
        if !self.columns.iter().any(|c| c == on) {
            return Err(DbError::column_not_found(&self.name, on));
        }
        if !other.columns.iter().any(|c| c == other_on) {
            return Err(DbError::column_not_found(&other.name, other_on));
        }

        let mut columns = self.columns.clone();
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        for col in &other.columns {
            if self.columns.iter().any(|c| c == col) {
                let renamed = format!("{}_{}", col, other.name);
                renames.insert(col.clone(), renamed.clone());
                columns.push(renamed);
            } else {
                columns.push(col.clone());
            }
        }

        let mut joined = Table::new(format!("{}_join_{}", self.name, other.name), columns);
        for left in &self.records {
            let key = left.get_or_null(on);
            if key.is_null() {
                continue;
            }
            for right in &other.records {
                if right.get_or_null(other_on) != key {
                    continue;
                }
                let mut data = left.data().clone();
                for (col, value) in right.data() {
                    let out_col = renames.get(col).cloned().unwrap_or_else(|| col.clone());
                    data.insert(out_col, value.clone());
                }
                joined.insert(data)?;
            }
        }
        Ok(joined)
    }

    /// Groups by one column and aggregates another.
    ///
    /// The result table has two columns: the group column and
    /// `<agg_column>_<fn>`. Groups appear in first-seen order.
    pub fn aggregate(
        &self,
        group_column: &str,
        agg_column: &str,
        function: AggregateFn,
    ) -> DbResult<Table> {
        if !self.columns.iter().any(|c| c == group_column) {
            return Err(DbError::column_not_found(&self.name, group_column));
        }
        if !self.columns.iter().any(|c| c == agg_column) {
            return Err(DbError::column_not_found(&self.name, agg_column));
        }

        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, (Value, Vec<Value>)> = BTreeMap::new();
        for record in &self.records {
            let group_value = record.get_or_null(group_column);
            let key = value_key(&group_value);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups
                .entry(key)
                .or_insert_with(|| (group_value, Vec::new()))
                .1
                .push(record.get_or_null(agg_column));
        }

        let out_column = format!("{}_{}", agg_column, function.suffix());
        let mut out = Table::new(
            format!("{}_{}", self.name, function.suffix()),
            vec![group_column.to_string(), out_column.clone()],
        );
        for key in order {
            let (group_value, values) = groups
                .remove(&key)
                .unwrap_or_else(|| unreachable!("seeded from order"));
            let result = apply_aggregate(function, &values)?;
            let mut data = RecordData::new();
            data.insert(group_column.to_string(), group_value);
            data.insert(out_column.clone(), result);
            out.insert(data)?;
        }
        Ok(out)
    }

    /// A new table with the records stably sorted on one column.
    ///
    /// Values are compared by type rank (null, bool, number, string, array,
    /// object) then within the type. Fresh ids are assigned in sort order.
    pub fn sort(&self, column: &str, ascending: bool) -> DbResult<Table> {
        if !self.columns.iter().any(|c| c == column) {
            return Err(DbError::column_not_found(&self.name, column));
        }
        let mut sorted: Vec<&Record> = self.records.iter().collect();
        sorted.sort_by(|a, b| {
            let ord = value_cmp(&a.get_or_null(column), &b.get_or_null(column));
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });

        let mut out = Table::new(format!("{}_sorted", self.name), self.columns.clone());
        for record in sorted {
            out.insert(record.data().clone())?;
        }
        Ok(out)
    }
}

fn apply_aggregate(function: AggregateFn, values: &[Value]) -> DbResult<Value> {
    match function {
        AggregateFn::Count => Ok(Value::from(values.len() as u64)),
        AggregateFn::CountDistinct => {
            let distinct: HashSet<String> = values.iter().map(value_key).collect();
            Ok(Value::from(distinct.len() as u64))
        }
        AggregateFn::Min => Ok(values
            .iter()
            .min_by(|a, b| value_cmp(a, b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFn::Max => Ok(values
            .iter()
            .max_by(|a, b| value_cmp(a, b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFn::Sum | AggregateFn::Avg => {
            let mut all_int = true;
            let mut int_sum: i64 = 0;
            let mut float_sum: f64 = 0.0;
            for value in values {
                let Some(n) = value.as_f64() else {
                    return Err(DbError::invalid_operation(format!(
                        "cannot aggregate non-numeric value {value}"
                    )));
                };
                float_sum += n;
                // a non-integer value or an overflowing integer sum both
                // demote the result to floating point
                match value.as_i64().and_then(|i| int_sum.checked_add(i)) {
                    Some(sum) => int_sum = sum,
                    None => all_int = false,
                }
            }
            if function == AggregateFn::Sum {
                if all_int {
                    Ok(Value::from(int_sum))
                } else {
                    Ok(Value::from(float_sum))
                }
            } else if values.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::from(float_sum / values.len() as f64))
            }
        }
    }
}

/// Total order over JSON values: type rank first, then within-type order.
/// Numbers compare as f64 via total ordering.
pub(crate) fn value_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| value_key(a).cmp(&value_key(b))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> RecordData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn people() -> Table {
        let mut t = Table::new("people", vec!["name".into(), "age".into()]);
        t.insert(data(&[("name", json!("ada")), ("age", json!(36))]))
            .unwrap();
        t.insert(data(&[("name", json!("bob")), ("age", json!(28))]))
            .unwrap();
        t.insert(data(&[("name", json!("cyn")), ("age", json!(36))]))
            .unwrap();
        t
    }

    #[test]
    fn sequential_ids_start_at_one() {
        let t = people();
        let ids: Vec<_> = t.records().iter().map(Record::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(t.next_id(), 4);
    }

    #[test]
    fn explicit_id_advances_next_id() {
        let mut t = Table::new("t", vec!["v".into()]);
        let id = t
            .insert(data(&[("id", json!(10)), ("v", json!("a"))]))
            .unwrap();
        assert_eq!(id, 10);
        assert_eq!(t.next_id(), 11);
        // the id key is stripped from stored data
        assert!(t.get(10).unwrap().get("id").is_none());
    }

    #[test]
    fn duplicate_explicit_id_errors_without_flex() {
        let mut t = Table::new("t", vec!["v".into()]);
        t.insert(data(&[("id", json!(5)), ("v", json!("a"))]))
            .unwrap();
        let err = t
            .insert(data(&[("id", json!(5)), ("v", json!("b"))]))
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateId { id: 5 }));
    }

    #[test]
    fn duplicate_explicit_id_remaps_with_flex() {
        let mut t = Table::new("t", vec!["v".into()]);
        t.insert(data(&[("id", json!(5)), ("v", json!("a"))]))
            .unwrap();
        let id = t
            .insert_with(data(&[("id", json!(5)), ("v", json!("b"))]), true)
            .unwrap();
        // remaps to next_id, one past the highest id seen
        assert_eq!(id, 6);
        assert_eq!(t.next_id(), 7);
    }

    #[test]
    fn largest_explicit_id_saturates_next_id() {
        let mut t = Table::new("t", vec!["v".into()]);
        let id = t
            .insert(data(&[("id", json!(u64::MAX)), ("v", json!("a"))]))
            .unwrap();
        assert_eq!(id, u64::MAX);
        assert_eq!(t.next_id(), u64::MAX);
    }

    #[test]
    fn unique_constraint_rejects_duplicates() {
        let mut t = Table::new("t", vec!["email".into()]);
        t.add_constraint("email", Constraint::Unique).unwrap();
        t.insert(data(&[("email", json!("a@x"))])).unwrap();
        let err = t.insert(data(&[("email", json!("a@x"))])).unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
    }

    #[test]
    fn unique_constraint_uses_index_when_present() {
        let mut t = Table::new("t", vec!["email".into()]);
        t.add_constraint("email", Constraint::Unique).unwrap();
        t.create_index("email").unwrap();
        t.insert(data(&[("email", json!("a@x"))])).unwrap();
        assert!(t.insert(data(&[("email", json!("a@x"))])).is_err());
        assert!(t.insert(data(&[("email", json!("b@x"))])).is_ok());
    }

    #[test]
    fn predicate_constraint_checks_candidate() {
        let mut t = Table::new("t", vec!["age".into()]);
        t.add_constraint(
            "age",
            Constraint::predicate("adult", |v| v.as_u64().is_some_and(|n| n >= 18)),
        )
        .unwrap();
        assert!(t.insert(data(&[("age", json!(21))])).is_ok());
        let err = t.insert(data(&[("age", json!(12))])).unwrap_err();
        match err {
            DbError::ConstraintViolation { constraint, .. } => {
                assert_eq!(constraint, "adult");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn constraint_on_unknown_column_errors() {
        let mut t = Table::new("t", vec!["a".into()]);
        let err = t.add_constraint("b", Constraint::Unique).unwrap_err();
        assert!(matches!(err, DbError::ColumnNotFound { .. }));
    }

    #[test]
    fn try_insert_swallows_failure() {
        let mut t = Table::new("t", vec!["v".into()]);
        t.add_constraint(
            "v",
            Constraint::predicate("never", |_| false),
        )
        .unwrap();
        assert_eq!(t.try_insert(data(&[("v", json!(1))])), None);
        assert!(t.is_empty());
    }

    #[test]
    fn bulk_insert_is_all_or_nothing() {
        let mut t = Table::new("t", vec!["email".into()]);
        t.add_constraint("email", Constraint::Unique).unwrap();
        let batch = vec![
            data(&[("email", json!("a@x"))]),
            data(&[("email", json!("a@x"))]),
        ];
        assert!(t.bulk_insert(batch).is_err());
        assert!(t.is_empty());
        assert_eq!(t.next_id(), 1);

        let ids = t
            .bulk_insert(vec![
                data(&[("email", json!("a@x"))]),
                data(&[("email", json!("b@x"))]),
            ])
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn delete_removes_record_and_index_entries() {
        let mut t = people();
        t.create_index("age").unwrap();
        t.delete(1).unwrap();
        assert!(t.get(1).is_none());
        assert_eq!(t.index("age").unwrap().find(&json!(36)), vec![3]);
        assert!(matches!(
            t.delete(99).unwrap_err(),
            DbError::RecordNotFound { id: 99 }
        ));
    }

    #[test]
    fn update_replaces_data_and_repairs_indexes() {
        let mut t = people();
        t.create_index("age").unwrap();
        t.update(2, data(&[("name", json!("bob")), ("age", json!(36))]))
            .unwrap();
        let mut hits = t.index("age").unwrap().find(&json!(36));
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2, 3]);
        assert!(t.index("age").unwrap().find(&json!(28)).is_empty());
    }

    #[test]
    fn update_missing_column_becomes_null() {
        let mut t = people();
        t.update(1, data(&[("name", json!("ada"))])).unwrap();
        assert_eq!(t.get(1).unwrap().get_or_null("age"), Value::Null);
    }

    #[test]
    fn update_unique_does_not_collide_with_self() {
        let mut t = Table::new("t", vec!["email".into()]);
        t.add_constraint("email", Constraint::Unique).unwrap();
        let id = t.insert(data(&[("email", json!("a@x"))])).unwrap();
        // re-writing the same value on the same record must pass
        t.update(id, data(&[("email", json!("a@x"))])).unwrap();
    }

    #[test]
    fn select_and_filter() {
        let t = people();
        let adults = t.select(|r| r.get_or_null("age") == json!(36));
        assert_eq!(adults.len(), 2);

        let filtered = t.filter(|r| r.get_or_null("age") == json!(36)).unwrap();
        assert_eq!(filtered.name(), "people_filtered");
        assert_eq!(filtered.len(), 2);
        // fresh ids in the derived table
        let ids: Vec<_> = filtered.records().iter().map(Record::id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn get_id_by_column_with_and_without_index() {
        let mut t = people();
        assert_eq!(t.get_id_by_column("name", &json!("bob")), Some(2));
        t.create_index("name").unwrap();
        assert_eq!(t.get_id_by_column("name", &json!("bob")), Some(2));
        assert_eq!(t.get_id_by_column("name", &json!("zed")), None);
    }

    #[test]
    fn join_matches_and_suffixes_collisions() {
        let mut users = Table::new("users", vec!["uid".into(), "name".into()]);
        users
            .insert(data(&[("uid", json!(1)), ("name", json!("ada"))]))
            .unwrap();
        users
            .insert(data(&[("uid", json!(2)), ("name", json!("bob"))]))
            .unwrap();

        let mut orders = Table::new("orders", vec!["user".into(), "name".into()]);
        orders
            .insert(data(&[("user", json!(1)), ("name", json!("book"))]))
            .unwrap();
        orders
            .insert(data(&[("user", json!(1)), ("name", json!("pen"))]))
            .unwrap();
        orders
            .insert(data(&[("user", json!(3)), ("name", json!("lamp"))]))
            .unwrap();

        let joined = users.join(&orders, "uid", "user").unwrap();
        assert_eq!(joined.name(), "users_join_orders");
        assert_eq!(joined.len(), 2);
        assert!(joined.columns().contains(&"name_orders".to_string()));
        let first = &joined.records()[0];
        assert_eq!(first.get_or_null("name"), json!("ada"));
        assert_eq!(first.get_or_null("name_orders"), json!("book"));
    }

    #[test]
    fn aggregate_sum_avg_count() {
        let t = people();
        let sums = t.aggregate("age", "age", AggregateFn::Count).unwrap();
        assert_eq!(sums.len(), 2);
        assert_eq!(sums.records()[0].get_or_null("age_count"), json!(2));

        let by_name = t.aggregate("name", "age", AggregateFn::Sum).unwrap();
        assert_eq!(by_name.records()[0].get_or_null("age_sum"), json!(36));

        let avg = t.aggregate("name", "age", AggregateFn::Avg).unwrap();
        assert_eq!(avg.records()[1].get_or_null("age_avg"), json!(28.0));
    }

    #[test]
    fn aggregate_sum_overflow_demotes_to_float() {
        let mut t = Table::new("t", vec!["g".into(), "v".into()]);
        for v in [i64::MAX, 1] {
            t.insert(data(&[("g", json!(1)), ("v", json!(v))])).unwrap();
        }
        let out = t.aggregate("g", "v", AggregateFn::Sum).unwrap();
        let sum = out.records()[0].get_or_null("v_sum");
        let expected = i64::MAX as f64 + 1.0;
        assert_eq!(sum.as_f64(), Some(expected));
        assert!(sum.as_i64().is_none());
    }

    #[test]
    fn aggregate_non_numeric_sum_errors() {
        let t = people();
        let err = t.aggregate("age", "name", AggregateFn::Sum).unwrap_err();
        assert!(matches!(err, DbError::InvalidOperation { .. }));
    }

    #[test]
    fn aggregate_count_distinct() {
        let mut t = Table::new("t", vec!["g".into(), "v".into()]);
        for v in ["a", "b", "a"] {
            t.insert(data(&[("g", json!(1)), ("v", json!(v))])).unwrap();
        }
        let out = t.aggregate("g", "v", AggregateFn::CountDistinct).unwrap();
        assert_eq!(out.records()[0].get_or_null("v_count_distinct"), json!(2));
    }

    #[test]
    fn sort_is_stable_and_directional() {
        let t = people();
        let asc = t.sort("age", true).unwrap();
        let names: Vec<_> = asc
            .records()
            .iter()
            .map(|r| r.get_or_null("name"))
            .collect();
        assert_eq!(names, vec![json!("bob"), json!("ada"), json!("cyn")]);

        let desc = t.sort("age", false).unwrap();
        let names: Vec<_> = desc
            .records()
            .iter()
            .map(|r| r.get_or_null("name"))
            .collect();
        // stable: ties keep insertion order even when descending
        assert_eq!(names, vec![json!("ada"), json!("cyn"), json!("bob")]);
    }

    #[test]
    fn sort_ranks_mixed_types() {
        let mut t = Table::new("t", vec!["v".into()]);
        t.insert(data(&[("v", json!("s"))])).unwrap();
        t.insert(data(&[("v", json!(2))])).unwrap();
        t.insert(data(&[("v", Value::Null)])).unwrap();
        let sorted = t.sort("v", true).unwrap();
        let vals: Vec<_> = sorted
            .records()
            .iter()
            .map(|r| r.get_or_null("v"))
            .collect();
        assert_eq!(vals, vec![Value::Null, json!(2), json!("s")]);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn index_tracks_inserts_and_deletes(values in proptest::collection::vec(0u8..5, 1..30)) {
                let mut t = Table::new("t", vec!["v".into()]);
                t.create_index("v").unwrap();
                let mut ids = Vec::new();
                for v in &values {
                    ids.push(t.insert(data(&[("v", json!(v))])).unwrap());
                }
                // delete every other record
                for id in ids.iter().step_by(2) {
                    t.delete(*id).unwrap();
                }
                // index agrees with a linear scan for every value
                for v in 0u8..5 {
                    let expected: Vec<RecordId> = t
                        .records()
                        .iter()
                        .filter(|r| r.get_or_null("v") == json!(v))
                        .map(Record::id)
                        .collect();
                    prop_assert_eq!(t.index("v").unwrap().find(&json!(v)), expected);
                }
            }
        }
    }
}

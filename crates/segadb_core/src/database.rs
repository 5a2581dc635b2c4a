//! The top-level database: a named set of tables plus the mutation
//! entry points that keep cross-table invariants intact.

use crate::config::Config;
use crate::constraint::Constraint;
use crate::error::{DbError, DbResult};
use crate::record::{RecordData, RecordId};
use crate::table::{AggregateFn, Table};
use crate::transaction::{LoggedOp, Shadow};
use std::collections::BTreeMap;

/// A single-process database holding every table in memory.
///
/// All mutations that touch constraints or the operation log go through
/// this type; [`Table`] handles only single-table concerns. Foreign keys
/// in particular are checked here, where sibling tables are visible.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) tables: BTreeMap<String, Table>,
    pub(crate) shadow: Option<Shadow>,
    pub(crate) op_log: Vec<LoggedOp>,
}

impl Database {
    /// Creates an empty database with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, Config::default())
    }

    /// Creates an empty database with explicit configuration.
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: Config) -> Self {
        Self {
            name: name.into(),
            config,
            tables: BTreeMap::new(),
            shadow: None,
            op_log: Vec::new(),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Table names in sorted order.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Borrows a table by name.
    pub fn get_table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::table_not_found(name))
    }

    /// Mutably borrows a table by name.
    ///
    /// Mutations made this way bypass foreign-key checks and the
    /// operation log; prefer the database-level entry points.
    pub fn get_table_mut(&mut self, name: &str) -> DbResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::table_not_found(name))
    }

    /// Total record count across all tables.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.tables.values().map(Table::len).sum()
    }

    /// Estimated on-disk size in bytes: the length of the serialized
    /// document before compression or encryption.
    pub fn size_estimate(&self) -> DbResult<usize> {
        let document = crate::storage::database_document(self);
        Ok(segadb_codec::encode_document(&document, false)?.len())
    }

    // ---- schema ----

    /// Creates a table, erroring if one with the name already exists.
    pub fn create_table(&mut self, name: &str, columns: Vec<String>) -> DbResult<()> {
        if self.tables.contains_key(name) {
            return Err(DbError::invalid_operation(format!(
                "table {name:?} already exists"
            )));
        }
        self.tables
            .insert(name.to_string(), Table::new(name, columns));
        self.log_op(LoggedOp::CreateTable {
            table: name.to_string(),
        });
        Ok(())
    }

    /// Drops a table.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        if self.tables.remove(name).is_none() {
            return Err(DbError::table_not_found(name));
        }
        self.log_op(LoggedOp::DropTable {
            table: name.to_string(),
        });
        Ok(())
    }

    /// Adds a constraint to a table column.
    ///
    /// For a foreign key, the referenced table must exist and declare the
    /// referenced column.
    pub fn add_constraint(
        &mut self,
        table: &str,
        column: &str,
        constraint: Constraint,
    ) -> DbResult<()> {
        if let Constraint::ForeignKey {
            reference_table,
            reference_column,
        } = &constraint
        {
            let referenced = self.get_table(reference_table)?;
            if !referenced.columns().iter().any(|c| c == reference_column) {
                return Err(DbError::column_not_found(reference_table, reference_column));
            }
        }
        let kind = constraint.name().to_string();
        self.get_table_mut(table)?.add_constraint(column, constraint)?;
        self.log_op(LoggedOp::AddConstraint {
            table: table.to_string(),
            column: column.to_string(),
            constraint: kind,
        });
        Ok(())
    }

    /// Creates a secondary index on a table column.
    pub fn create_index(&mut self, table: &str, column: &str) -> DbResult<()> {
        self.get_table_mut(table)?.create_index(column)?;
        self.log_op(LoggedOp::CreateIndex {
            table: table.to_string(),
            column: column.to_string(),
        });
        Ok(())
    }

    // ---- mutation ----

    /// Inserts a record, enforcing foreign keys against sibling tables.
    pub fn insert(&mut self, table: &str, data: RecordData) -> DbResult<RecordId> {
        self.insert_with(table, data, false)
    }

    /// Inserts a record with flexible id collision handling.
    pub fn insert_with(
        &mut self,
        table: &str,
        data: RecordData,
        flex_ids: bool,
    ) -> DbResult<RecordId> {
        self.fk_check(table, &data)?;
        let id = self.get_table_mut(table)?.insert_with(data, flex_ids)?;
        self.log_op(LoggedOp::Insert {
            table: table.to_string(),
            id,
        });
        Ok(id)
    }

    /// Inserts a record, discarding it silently on failure.
    pub fn try_insert(&mut self, table: &str, data: RecordData) -> Option<RecordId> {
        match self.insert(table, data) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(table, error = %err, "insert rejected");
                None
            }
        }
    }

    /// Inserts a batch atomically.
    pub fn bulk_insert(&mut self, table: &str, batch: Vec<RecordData>) -> DbResult<Vec<RecordId>> {
        for data in &batch {
            self.fk_check(table, data)?;
        }
        let count = batch.len();
        let ids = self.get_table_mut(table)?.bulk_insert(batch)?;
        self.log_op(LoggedOp::BulkInsert {
            table: table.to_string(),
            count,
        });
        Ok(ids)
    }

    /// Replaces a record's data.
    pub fn update(&mut self, table: &str, id: RecordId, data: RecordData) -> DbResult<()> {
        self.fk_check(table, &data)?;
        self.get_table_mut(table)?.update(id, data)?;
        self.log_op(LoggedOp::Update {
            table: table.to_string(),
            id,
        });
        Ok(())
    }

    /// Deletes a record.
    pub fn delete(&mut self, table: &str, id: RecordId) -> DbResult<()> {
        self.get_table_mut(table)?.delete(id)?;
        self.log_op(LoggedOp::Delete {
            table: table.to_string(),
            id,
        });
        Ok(())
    }

    /// Validates every foreign-key constraint on `table` against the
    /// referenced tables. An absent column counts as null, the same as
    /// the unique and predicate checks, so an unreferenced row cannot
    /// slip in by omitting the constrained column.
    fn fk_check(&self, table: &str, data: &RecordData) -> DbResult<()> {
        let target = self.get_table(table)?;
        for (column, constraints) in target.constraints() {
            let value = data.get(column).cloned().unwrap_or(serde_json::Value::Null);
            for constraint in constraints {
                let Constraint::ForeignKey {
                    reference_table,
                    reference_column,
                } = constraint
                else {
                    continue;
                };
                let referenced = self.get_table(reference_table)?;
                let found = referenced
                    .get_id_by_column(reference_column, &value)
                    .is_some();
                if !found {
                    return Err(DbError::constraint_violation(column, &value, "foreign_key"));
                }
            }
        }
        Ok(())
    }

    /// Loads a CSV file into a new table named `table`.
    ///
    /// Parsing runs on the configured worker pool; `worker_threads` and
    /// `max_chunk_size` from [`Config`] shape the fan-out.
    pub fn create_table_from_csv(
        &mut self,
        path: impl AsRef<std::path::Path>,
        table: &str,
    ) -> DbResult<()> {
        if self.tables.contains_key(table) {
            return Err(DbError::invalid_operation(format!(
                "table {table:?} already exists"
            )));
        }
        let mut options = crate::storage::csv::CsvOptions {
            parallel: true,
            workers: self.config.worker_threads,
            ..crate::storage::csv::CsvOptions::default()
        };
        if let Some(max) = self.config.max_chunk_size {
            options.max_chunk_size = max;
        }
        let loaded = crate::storage::csv::table_from_csv(path, table, &options)?;
        self.tables.insert(table.to_string(), loaded);
        self.log_op(LoggedOp::CreateTable {
            table: table.to_string(),
        });
        Ok(())
    }

    // ---- derived tables ----

    /// Joins two tables and returns the result without storing it.
    pub fn join_tables(
        &self,
        left: &str,
        right: &str,
        on: &str,
        other_on: &str,
    ) -> DbResult<Table> {
        let left = self.get_table(left)?;
        let right = self.get_table(right)?;
        left.join(right, on, other_on)
    }

    /// Groups and aggregates a table, returning the result.
    pub fn aggregate_table(
        &self,
        table: &str,
        group_column: &str,
        agg_column: &str,
        function: AggregateFn,
    ) -> DbResult<Table> {
        self.get_table(table)?
            .aggregate(group_column, agg_column, function)
    }

    /// Filters a table into a new table, returning the result.
    pub fn filter_table<F>(&self, table: &str, predicate: F) -> DbResult<Table>
    where
        F: Fn(&crate::record::Record) -> bool,
    {
        self.get_table(table)?.filter(predicate)
    }

    pub(crate) fn log_op(&mut self, op: LoggedOp) {
        if self.config.log_operations {
            tracing::info!(db = %self.name, op = %op, "operation");
        }
        self.op_log.push(op);
    }
}

//! Shadow-copy transactions over the whole database.
//!
//! Mutations apply immediately; `begin` snapshots every table so that
//! `rollback` can restore them wholesale. The operation log is an audit
//! trail only, never replayed.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::record::RecordId;
use crate::table::Table;
use std::collections::BTreeMap;
use std::fmt;

/// Full-table snapshot taken at `begin`.
#[derive(Debug, Clone)]
pub(crate) struct Shadow {
    pub(crate) tables: BTreeMap<String, Table>,
}

/// One applied mutation, recorded for audit and preview.
#[derive(Debug, Clone)]
pub(crate) enum LoggedOp {
    CreateTable {
        table: String,
    },
    DropTable {
        table: String,
    },
    Insert {
        table: String,
        id: RecordId,
    },
    BulkInsert {
        table: String,
        count: usize,
    },
    Update {
        table: String,
        id: RecordId,
    },
    Delete {
        table: String,
        id: RecordId,
    },
    AddConstraint {
        table: String,
        column: String,
        constraint: String,
    },
    CreateIndex {
        table: String,
        column: String,
    },
}

impl fmt::Display for LoggedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table } => write!(f, "create_table {table}"),
            Self::DropTable { table } => write!(f, "drop_table {table}"),
            Self::Insert { table, id } => write!(f, "insert {table} id={id}"),
            Self::BulkInsert { table, count } => {
                write!(f, "bulk_insert {table} count={count}")
            }
            Self::Update { table, id } => write!(f, "update {table} id={id}"),
            Self::Delete { table, id } => write!(f, "delete {table} id={id}"),
            Self::AddConstraint {
                table,
                column,
                constraint,
            } => write!(f, "add_constraint {table}.{column} {constraint}"),
            Self::CreateIndex { table, column } => {
                write!(f, "create_index {table}.{column}")
            }
        }
    }
}

impl Database {
    /// Begins a transaction by snapshotting every table.
    ///
    /// Beginning while a transaction is already active replaces the
    /// snapshot: the earlier pending work becomes permanent.
    pub fn begin(&mut self) {
        if self.shadow.is_some() {
            tracing::warn!(db = %self.name, "begin while active; previous snapshot replaced");
        }
        self.shadow = Some(Shadow {
            tables: self.tables.clone(),
        });
        self.op_log.clear();
    }

    /// Whether a transaction is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.shadow.is_some()
    }

    /// Makes the pending work permanent by discarding the snapshot.
    pub fn commit(&mut self) -> DbResult<()> {
        if self.shadow.take().is_none() {
            return Err(DbError::invalid_operation("commit without active transaction"));
        }
        self.op_log.clear();
        Ok(())
    }

    /// Restores every table from the snapshot, undoing pending work.
    pub fn rollback(&mut self) -> DbResult<()> {
        let Some(shadow) = self.shadow.take() else {
            return Err(DbError::invalid_operation(
                "rollback without active transaction",
            ));
        };
        self.tables = shadow.tables;
        self.op_log.clear();
        Ok(())
    }

    /// Human-readable listing of the pending operations, one per line.
    #[must_use]
    pub fn preview(&self) -> String {
        self.op_log
            .iter()
            .enumerate()
            .map(|(i, op)| format!("{}. {op}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

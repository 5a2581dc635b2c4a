//! Lazy, partial view over a saved database file.
//!
//! Opening reads only the database name and table list; tables stay
//! dormant until first touched, then are materialized and cached. A
//! table can be deactivated again, writing it back into the file and
//! dropping it from memory.

use crate::constraint::PredicateRegistry;
use crate::error::{DbError, DbResult};
use crate::storage::{
    load_table_from_file, save_table_into_file, table_names_in_file, LoadOptions, SaveOptions,
};
use crate::table::Table;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A database file opened table-by-table instead of all at once.
#[derive(Debug)]
pub struct PartialDatabase {
    name: String,
    path: PathBuf,
    options: LoadOptions,
    active: BTreeMap<String, Table>,
    known: Vec<String>,
}

impl PartialDatabase {
    /// Opens a database file, reading only its name and table list.
    pub fn open(path: impl Into<PathBuf>, options: LoadOptions) -> DbResult<Self> {
        let path = path.into();
        let (name, known) = table_names_in_file(&path, &options)?;
        Ok(Self {
            name,
            path,
            options,
            active: BTreeMap::new(),
            known,
        })
    }

    /// Database name as stored in the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All table names present in the file, loaded or not.
    #[must_use]
    pub fn table_names(&self) -> &[String] {
        &self.known
    }

    /// Names of tables currently materialized in memory.
    #[must_use]
    pub fn active_tables(&self) -> Vec<&str> {
        self.active.keys().map(String::as_str).collect()
    }

    /// Names of tables still only on disk.
    #[must_use]
    pub fn dormant_tables(&self) -> Vec<&str> {
        self.known
            .iter()
            .filter(|name| !self.active.contains_key(*name))
            .map(String::as_str)
            .collect()
    }

    /// Whether a table is currently loaded.
    #[must_use]
    pub fn is_active(&self, table: &str) -> bool {
        self.active.contains_key(table)
    }

    /// Borrows a table, loading it from the file on first access.
    ///
    /// A failed load leaves the table dormant so a later call can retry.
    pub fn get_table(&mut self, table: &str) -> DbResult<&Table> {
        self.activate(table, &PredicateRegistry::new())?;
        self.active
            .get(table)
            .ok_or_else(|| DbError::table_not_found(table))
    }

    /// Mutably borrows a table, loading it on first access.
    pub fn get_table_mut(&mut self, table: &str) -> DbResult<&mut Table> {
        self.activate(table, &PredicateRegistry::new())?;
        self.active
            .get_mut(table)
            .ok_or_else(|| DbError::table_not_found(table))
    }

    /// Loads a table with predicate constraints resolved from a registry.
    pub fn get_table_with_registry(
        &mut self,
        table: &str,
        registry: &PredicateRegistry,
    ) -> DbResult<&Table> {
        self.activate(table, registry)?;
        self.active
            .get(table)
            .ok_or_else(|| DbError::table_not_found(table))
    }

    fn activate(&mut self, table: &str, registry: &PredicateRegistry) -> DbResult<()> {
        if self.active.contains_key(table) {
            return Ok(());
        }
        if !self.known.iter().any(|n| n == table) {
            return Err(DbError::table_not_found(table));
        }
        let loaded = load_table_from_file(&self.path, table, &self.options, registry)?;
        tracing::debug!(db = %self.name, table, "table activated");
        self.active.insert(table.to_string(), loaded);
        Ok(())
    }

    /// Writes a loaded table back into the file and drops it from memory.
    ///
    /// Deactivating a dormant table is an error; nothing would be saved.
    pub fn deactivate_table(&mut self, table: &str, save_options: &SaveOptions) -> DbResult<()> {
        let loaded = self
            .active
            .get(table)
            .ok_or_else(|| DbError::invalid_operation(format!("table {table:?} is not active")))?;
        save_table_into_file(loaded, &self.path, save_options, &self.options)?;
        self.active.remove(table);
        tracing::debug!(db = %self.name, table, "table deactivated");
        Ok(())
    }
}

//! Persistence: whole-database save/load through the document codec,
//! with optional compression and encryption, plus single-table I/O.
//!
//! On disk a database is one file: JSON, optionally DEFLATE-compressed,
//! optionally encrypted into a base64url token. Writes go through a
//! sibling temp file and an atomic rename, so a crash mid-save leaves
//! the previous file intact.

pub mod backup;
pub mod csv;
pub mod export;

use crate::constraint::PredicateRegistry;
use crate::crypto::{EncryptionKey, Fernet};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::record::Record;
use crate::table::Table;
use rayon::prelude::*;
use segadb_codec::{
    decode_document, encode_document, DatabaseDocument, RecordDocument, TableDocument,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Record count above which table reconstruction fans out across threads.
const PARALLEL_THRESHOLD: usize = 10_000;

/// How to write a database file.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Encrypt the payload under this key.
    pub key: Option<EncryptionKey>,
    /// DEFLATE-compress the JSON before any encryption.
    pub compress: bool,
}

impl SaveOptions {
    /// Plain JSON, no compression or encryption.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables compression.
    #[must_use]
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Enables encryption under the given key.
    #[must_use]
    pub fn encrypted(mut self, key: EncryptionKey) -> Self {
        self.key = Some(key);
        self
    }
}

/// How to read a database file. Must mirror the options it was saved with.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Decryption key, when the file was saved encrypted.
    pub key: Option<EncryptionKey>,
    /// Whether the payload is compressed.
    pub compress: bool,
    /// Reconstruct large tables on a worker pool.
    pub parallel: bool,
    /// Worker threads for parallel reconstruction; 0 uses the global pool.
    pub workers: usize,
}

impl LoadOptions {
    /// Plain JSON, serial reconstruction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects a compressed payload.
    #[must_use]
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Expects an encrypted payload.
    #[must_use]
    pub fn encrypted(mut self, key: EncryptionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Enables parallel reconstruction of large tables.
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Caps the worker pool used for parallel reconstruction.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }
}

/// Saves a database to a file.
pub fn save(db: &Database, path: impl AsRef<Path>, options: &SaveOptions) -> DbResult<()> {
    let document = database_document(db);
    let payload = encode_document(&document, options.compress)?;
    let bytes = match &options.key {
        Some(key) => Fernet::new(key.clone()).encrypt(&payload).into_bytes(),
        None => payload,
    };
    write_atomic(path.as_ref(), &bytes)?;
    tracing::debug!(db = %db.name(), path = %path.as_ref().display(), "database saved");
    Ok(())
}

/// Loads a database from a file. Predicate constraints are dropped, since
/// no registry is available to resolve their names.
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> DbResult<Database> {
    load_with_registry(path, options, &PredicateRegistry::new())
}

/// Loads a database, resolving predicate constraint names against a
/// registry. Names missing from the registry are dropped with a warning.
pub fn load_with_registry(
    path: impl AsRef<Path>,
    options: &LoadOptions,
    registry: &PredicateRegistry,
) -> DbResult<Database> {
    let document = read_document(path.as_ref(), options)?;
    if options.parallel && options.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .map_err(|e| DbError::invalid_operation(format!("thread pool: {e}")))?;
        Ok(pool.install(|| rebuild_database(document, registry, true)))
    } else {
        Ok(rebuild_database(document, registry, options.parallel))
    }
}

/// Deletes a database file.
pub fn delete(path: impl AsRef<Path>) -> DbResult<()> {
    fs::remove_file(path.as_ref())?;
    Ok(())
}

/// Loads a single table out of a database file without materializing the
/// other tables.
pub fn load_table_from_file(
    path: impl AsRef<Path>,
    table: &str,
    options: &LoadOptions,
    registry: &PredicateRegistry,
) -> DbResult<Table> {
    let mut document = read_document(path.as_ref(), options)?;
    let table_doc = document
        .tables
        .remove(table)
        .ok_or_else(|| DbError::table_not_found(table))?;
    Ok(table_from_document(table_doc, registry, options.parallel))
}

/// Rewrites one table inside an existing database file, leaving the
/// other tables as stored.
pub fn save_table_into_file(
    table: &Table,
    path: impl AsRef<Path>,
    save_options: &SaveOptions,
    load_options: &LoadOptions,
) -> DbResult<()> {
    let mut document = read_document(path.as_ref(), load_options)?;
    document
        .tables
        .insert(table.name().to_string(), table_document(table));
    let payload = encode_document(&document, save_options.compress)?;
    let bytes = match &save_options.key {
        Some(key) => Fernet::new(key.clone()).encrypt(&payload).into_bytes(),
        None => payload,
    };
    write_atomic(path.as_ref(), &bytes)
}

/// Reads the table names present in a database file, without building
/// any tables.
pub fn table_names_in_file(
    path: impl AsRef<Path>,
    options: &LoadOptions,
) -> DbResult<(String, Vec<String>)> {
    let document = read_document(path.as_ref(), options)?;
    let names = document.tables.keys().cloned().collect();
    Ok((document.name, names))
}

pub(crate) fn read_document(path: &Path, options: &LoadOptions) -> DbResult<DatabaseDocument> {
    let bytes = fs::read(path)?;
    let payload = match &options.key {
        Some(key) => {
            let token = std::str::from_utf8(&bytes)
                .map_err(|_| DbError::invalid_format("encrypted file is not valid UTF-8"))?;
            Fernet::new(key.clone()).decrypt(token)?
        }
        None => bytes,
    };
    Ok(decode_document(&payload, options.compress)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> DbResult<()> {
    // Append rather than replace the extension, so db.segadb and db.json
    // in the same directory never share a temp name.
    let file_name = path
        .file_name()
        .ok_or_else(|| DbError::invalid_format(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Converts a live database into its document form.
#[must_use]
pub fn database_document(db: &Database) -> DatabaseDocument {
    let tables = db
        .tables
        .iter()
        .map(|(name, table)| (name.clone(), table_document(table)))
        .collect();
    DatabaseDocument {
        name: db.name().to_string(),
        tables,
    }
}

fn table_document(table: &Table) -> TableDocument {
    let records = table
        .records()
        .iter()
        .map(|r| RecordDocument {
            id: r.id(),
            data: r.data().clone(),
        })
        .collect();
    let constraints = table
        .constraints()
        .iter()
        .map(|(column, cs)| {
            (
                column.clone(),
                cs.iter().map(|c| c.to_document()).collect(),
            )
        })
        .collect();
    TableDocument {
        name: table.name().to_string(),
        columns: table.columns().to_vec(),
        records,
        next_id: table.next_id(),
        constraints,
    }
}

/// Rebuilds a live database from its document form, serially.
#[must_use]
pub fn database_from_document(
    document: DatabaseDocument,
    registry: &PredicateRegistry,
) -> Database {
    rebuild_database(document, registry, false)
}

fn rebuild_database(
    document: DatabaseDocument,
    registry: &PredicateRegistry,
    parallel: bool,
) -> Database {
    let mut db = Database::new(document.name);
    db.tables = document
        .tables
        .into_iter()
        .map(|(name, table_doc)| (name, table_from_document(table_doc, registry, parallel)))
        .collect();
    db
}

fn table_from_document(doc: TableDocument, registry: &PredicateRegistry, parallel: bool) -> Table {
    let records: Vec<Record> = if parallel && doc.records.len() >= PARALLEL_THRESHOLD {
        doc.records
            .into_par_iter()
            .map(|r| Record::new(r.id, r.data))
            .collect()
    } else {
        doc.records
            .into_iter()
            .map(|r| Record::new(r.id, r.data))
            .collect()
    };

    let mut constraints = BTreeMap::new();
    for (column, docs) in doc.constraints {
        let mut resolved = Vec::with_capacity(docs.len());
        for constraint_doc in &docs {
            match registry.resolve(constraint_doc) {
                Some(constraint) => resolved.push(constraint),
                None => {
                    tracing::warn!(
                        table = %doc.name,
                        column = %column,
                        "predicate constraint not in registry; dropped"
                    );
                }
            }
        }
        if !resolved.is_empty() {
            constraints.insert(column, resolved);
        }
    }

    Table::from_parts(doc.name, doc.columns, records, doc.next_id, constraints)
}

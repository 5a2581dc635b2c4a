//! Single-process, file-backed record store.
//!
//! A [`Database`] holds named [`Table`]s of JSON-valued records entirely
//! in memory. Tables carry per-column constraints (unique, foreign key,
//! named predicate) and optional secondary indexes. Whole-database
//! shadow-copy transactions give cheap rollback; persistence flows
//! through a JSON document that can be compressed and encrypted at rest.
//!
//! ```
//! use segadb_core::{Database, RecordData};
//! use serde_json::json;
//!
//! let mut db = Database::new("demo");
//! db.create_table("people", vec!["name".into(), "age".into()])?;
//!
//! let mut data = RecordData::new();
//! data.insert("name".into(), json!("ada"));
//! data.insert("age".into(), json!(36));
//! let id = db.insert("people", data)?;
//! assert_eq!(id, 1);
//! # Ok::<(), segadb_core::DbError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod constraint;
pub mod crypto;
pub mod database;
pub mod error;
pub mod index;
pub mod partial;
pub mod record;
pub mod storage;
pub mod table;
pub mod transaction;

pub use auth::{Authenticator, Permission, PermissionSet, Role, UserManager};
pub use config::Config;
pub use constraint::{Constraint, PredicateFn, PredicateRegistry};
pub use crypto::{EncryptionKey, Fernet};
pub use database::Database;
pub use error::{DbError, DbResult};
pub use index::Index;
pub use partial::PartialDatabase;
pub use record::{Record, RecordData, RecordId};
pub use storage::backup::{BackupEntry, BackupManager};
pub use storage::csv::{table_from_csv, ColumnType, CsvOptions};
pub use storage::export::{save_table, TableFormat};
pub use storage::{load, load_with_registry, save, LoadOptions, SaveOptions};
pub use table::{AggregateFn, Table};

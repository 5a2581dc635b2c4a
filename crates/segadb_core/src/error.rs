//! Error types for SegaDB core.

use std::io;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in SegaDB operations.
///
/// Mutating operations that fail leave the table unchanged: a constraint
/// violation or duplicate id is raised before anything is applied.
#[derive(Debug, Error)]
pub enum DbError {
    /// A column constraint rejected a candidate value.
    #[error("constraint violation on column {column} for value {value} ({constraint})")]
    ConstraintViolation {
        /// Column the constraint is attached to.
        column: String,
        /// Rejected value, rendered as JSON text.
        value: String,
        /// Name of the violated constraint.
        constraint: String,
    },

    /// An explicitly supplied record id is already in use.
    #[error("record id {id} is already in use")]
    DuplicateId {
        /// The colliding id.
        id: u64,
    },

    /// Record lookup by id failed.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// The missing id.
        id: u64,
    },

    /// Table lookup by name failed.
    #[error("table not found: {name}")]
    TableNotFound {
        /// The missing table name.
        name: String,
    },

    /// Column lookup failed.
    #[error("column not found: {table}.{column}")]
    ColumnNotFound {
        /// Table searched.
        table: String,
        /// The missing column name.
        column: String,
    },

    /// A privileged operation was attempted without valid credentials.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the missing permission or failed authentication.
        message: String,
    },

    /// I/O error during save/load/backup.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Document encode/decode error.
    #[error("codec error: {0}")]
    Codec(#[from] segadb_codec::CodecError),

    /// PKCS7 padding check failed on decryption.
    ///
    /// This is the only detectable decryption failure: the file format
    /// carries no authentication tag, so a wrong key or corrupted
    /// ciphertext surfaces here (or not at all).
    #[error("invalid padding: wrong key or corrupted ciphertext")]
    Padding,

    /// Encryption key has the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Input data is malformed (bad base64, bad CSV row, bad file layout).
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl DbError {
    /// Creates a constraint violation error.
    pub fn constraint_violation(
        column: impl Into<String>,
        value: &serde_json::Value,
        constraint: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            column: column.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a permission denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

//! # SegaDB Codec
//!
//! Canonical document model and byte pipeline for `.segadb` files.
//!
//! A `.segadb` file is a JSON document of the form
//!
//! ```json
//! {
//!   "name": "mydb",
//!   "tables": {
//!     "users": {
//!       "name": "users",
//!       "columns": ["name", "email"],
//!       "records": [{"id": 1, "data": {"name": "A", "email": "a@x.com"}}],
//!       "next_id": 2,
//!       "constraints": {"email": [{"type": "unique"}]}
//!     }
//!   }
//! }
//! ```
//!
//! optionally DEFLATE-compressed (zlib framing). Encryption is layered on
//! top of this pipeline by the core crate; this crate is key-free.
//!
//! The document is the pivot format for persistence: it is always produced
//! and consumed wholesale, never patched in place.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod pipeline;

pub use document::{ColumnData, ConstraintDocument, DatabaseDocument, RecordDocument, TableDocument};
pub use error::{CodecError, CodecResult};
pub use pipeline::{decode_document, encode_document};

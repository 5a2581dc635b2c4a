//! Column constraints and the named-predicate registry.

use segadb_codec::ConstraintDocument;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Boolean check over a candidate column value.
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A column-scoped invariant, checked on insert and update.
///
/// The variant set is closed: constraint bodies are never stored or loaded
/// as executable source. Predicate constraints carry a registry name and a
/// function handle; only the name is persisted.
#[derive(Clone)]
pub enum Constraint {
    /// Column values must be unique across the table.
    Unique,
    /// Column values must exist in `reference_table.reference_column`.
    ///
    /// Enforced by [`Database`](crate::Database), which can see sibling
    /// tables; a standalone table cannot resolve the reference.
    ForeignKey {
        /// Name of the referenced table.
        reference_table: String,
        /// Name of the referenced column.
        reference_column: String,
    },
    /// A named predicate over the candidate value.
    Predicate {
        /// Registry name; the persisted identity of this constraint.
        name: String,
        /// The check itself.
        check: PredicateFn,
    },
}

impl Constraint {
    /// Builds a predicate constraint from a name and a check function.
    pub fn predicate(
        name: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Returns a short human-readable name for error messages and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unique => "unique",
            Self::ForeignKey { .. } => "foreign_key",
            Self::Predicate { name, .. } => name,
        }
    }

    /// Converts to the serializable document form.
    #[must_use]
    pub fn to_document(&self) -> ConstraintDocument {
        match self {
            Self::Unique => ConstraintDocument::Unique,
            Self::ForeignKey {
                reference_table,
                reference_column,
            } => ConstraintDocument::ForeignKey {
                reference_table: reference_table.clone(),
                reference_column: reference_column.clone(),
            },
            Self::Predicate { name, .. } => ConstraintDocument::Predicate { name: name.clone() },
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique => f.write_str("Unique"),
            Self::ForeignKey {
                reference_table,
                reference_column,
            } => f
                .debug_struct("ForeignKey")
                .field("reference_table", reference_table)
                .field("reference_column", reference_column)
                .finish(),
            Self::Predicate { name, .. } => {
                f.debug_struct("Predicate").field("name", name).finish()
            }
        }
    }
}

/// Registry of named predicate handles.
///
/// Loading a saved database resolves predicate constraints against this
/// registry by name. Names not present in the registry are dropped with a
/// warning rather than silently resurrected as no-ops.
#[derive(Default)]
pub struct PredicateRegistry {
    entries: HashMap<String, PredicateFn>,
}

impl PredicateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate under a name, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) {
        self.entries.insert(name.into(), Arc::new(check));
    }

    /// Looks up a predicate handle by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PredicateFn> {
        self.entries.get(name).cloned()
    }

    /// Resolves a document constraint back to a live constraint.
    ///
    /// Returns `None` for a predicate whose name is not registered.
    #[must_use]
    pub fn resolve(&self, doc: &ConstraintDocument) -> Option<Constraint> {
        match doc {
            ConstraintDocument::Unique => Some(Constraint::Unique),
            ConstraintDocument::ForeignKey {
                reference_table,
                reference_column,
            } => Some(Constraint::ForeignKey {
                reference_table: reference_table.clone(),
                reference_column: reference_column.clone(),
            }),
            ConstraintDocument::Predicate { name } => self.get(name).map(|check| {
                Constraint::Predicate {
                    name: name.clone(),
                    check,
                }
            }),
        }
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("names", &names)
            .finish()
    }
}

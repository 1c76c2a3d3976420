//! Entity schema declarations and their SQLite materialization.
//!
//! # Responsibility
//! - Define the entity descriptor contract driven by the synchronizer.
//! - Hold the declarative relationship graph.
//! - Materialize declared tables and wipe them on full reset.
//!
//! # Invariants
//! - Identifiers are validated before they are interpolated into SQL.
//! - Schema objects are only touched through the connection handed in by the
//!   caller; nothing here opens its own session.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod dropper;
pub mod entity;
pub mod relationship;
pub mod table;

pub use dropper::{DropError, TableDropper};
pub use entity::{EntityDescriptor, SyncContext, SyncError, SyncOptions, TableDirectory};
pub use relationship::{ForeignKey, GraphError, Relationship, RelationshipGraph, RelationshipKind};
pub use table::{Column, ColumnType, TableSchema};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub(crate) fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Double-quotes an already validated identifier.
pub(crate) fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

//! Entity descriptor contract and per-call synchronization context.

use super::relationship::RelationshipGraph;
use crate::log_sink::{LogCode, LogSink};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Options passed uniformly to every `sync` call of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Drop and re-create the entity's schema.
    pub force_recreate: bool,
    /// Permit structural alterations of an existing schema.
    pub allow_alter: bool,
    /// Forward every driver statement to the logger at info severity.
    pub verbose: bool,
}

impl SyncOptions {
    /// Options for the repair pass: alter, never recreate.
    pub fn repair(verbose: bool) -> Self {
        Self {
            force_recreate: false,
            allow_alter: true,
            verbose,
        }
    }
}

/// Per-entity synchronization failure.
#[derive(Debug)]
pub enum SyncError {
    Sqlite(rusqlite::Error),
    /// Live schema differs from the declaration and alteration is disabled.
    Drift { entity: String, detail: String },
    /// Declaration cannot be materialized as written.
    InvalidDeclaration { entity: String, detail: String },
    /// Relationship points at an entity that is not declared.
    UnknownReference { entity: String, target: String },
    Other(String),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(_) => f.write_str("sqlite error"),
            Self::Drift { entity, detail } => write!(f, "schema drift on {entity}: {detail}"),
            Self::InvalidDeclaration { entity, detail } => {
                write!(f, "invalid declaration for {entity}: {detail}")
            }
            Self::UnknownReference { entity, target } => {
                write!(f, "{entity} references undeclared entity {target}")
            }
            Self::Other(message) => f.write_str(message),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Entity name to table name lookup for every declared entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDirectory {
    tables: BTreeMap<String, String>,
}

impl TableDirectory {
    pub fn from_entities(entities: &[Box<dyn EntityDescriptor>]) -> Self {
        let tables = entities
            .iter()
            .map(|entity| (entity.name().to_string(), entity.table_name().to_string()))
            .collect();
        Self { tables }
    }

    pub fn table_for(&self, entity: &str) -> Option<&str> {
        self.tables.get(entity).map(String::as_str)
    }
}

/// Everything one `sync` call may touch.
pub struct SyncContext<'a> {
    pub conn: &'a Connection,
    pub options: SyncOptions,
    pub relationships: &'a RelationshipGraph,
    pub tables: &'a TableDirectory,
    pub logger: &'a dyn LogSink,
}

impl SyncContext<'_> {
    /// Forwards one driver statement when verbose logging is on.
    pub fn trace_statement(&self, component: &str, sql: &str) {
        if self.options.verbose {
            self.logger.info(component, LogCode::NotApplicable, sql, None);
        }
    }
}

/// One schema unit (table) supplied by the domain layer.
pub trait EntityDescriptor {
    fn name(&self) -> &str;

    fn table_name(&self) -> &str {
        self.name()
    }

    /// Reconciles the live schema with this declaration.
    fn sync(&self, ctx: &SyncContext<'_>) -> Result<(), SyncError>;
}

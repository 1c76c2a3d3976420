//! Destructive full-reset pre-step.
//!
//! # Invariants
//! - Never runs unless the caller explicitly enables it.
//! - Tables are dropped in reverse declared order so dependents go first.

use super::entity::EntityDescriptor;
use super::{is_valid_identifier, quote_ident};
use crate::log_sink::{LogCode, LogSink};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

const COMPONENT: &str = "Database";

#[derive(Debug)]
pub enum DropError {
    InvalidTable(String),
    Sqlite { table: String, source: rusqlite::Error },
}

impl Display for DropError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTable(table) => write!(f, "refusing to drop invalid table name `{table}`"),
            Self::Sqlite { table, .. } => write!(f, "failed to drop {table}"),
        }
    }
}

impl Error for DropError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTable(_) => None,
            Self::Sqlite { source, .. } => Some(source),
        }
    }
}

/// Drops every table owned by the declared entities.
pub struct TableDropper<'a> {
    conn: &'a Connection,
    logger: &'a dyn LogSink,
    verbose: bool,
}

impl<'a> TableDropper<'a> {
    pub fn new(conn: &'a Connection, logger: &'a dyn LogSink, verbose: bool) -> Self {
        Self {
            conn,
            logger,
            verbose,
        }
    }

    /// Irreversibly drops all listed tables.
    ///
    /// Stops at the first failing table; tables already dropped stay dropped.
    pub fn drop_all(&self, entities: &[Box<dyn EntityDescriptor>]) -> Result<(), DropError> {
        for entity in entities.iter().rev() {
            let table = entity.table_name();
            if !is_valid_identifier(table) {
                return Err(DropError::InvalidTable(table.to_string()));
            }
            let sql = format!("DROP TABLE IF EXISTS {};", quote_ident(table));
            if self.verbose {
                self.logger.info(COMPONENT, LogCode::NotApplicable, &sql, None);
            }
            self.conn
                .execute_batch(&sql)
                .map_err(|source| DropError::Sqlite {
                    table: table.to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

//! Sequential synchronization passes.
//!
//! # Responsibility
//! - Walk an ordered entity list one entity at a time.
//! - Capture per-entity failures without aborting the walk.
//! - Re-walk exactly the failed entities in repair mode.
//!
//! # Invariants
//! - Entities are visited in declared order, never concurrently.
//! - `attempted == succeeded + failed` for every produced `PassResult`.
//! - Entity errors never escape a pass.

use crate::log_sink::{describe_cause, LogCode, LogSink};
use crate::schema::{
    EntityDescriptor, RelationshipGraph, SyncContext, SyncOptions, TableDirectory,
};
use rusqlite::Connection;
use serde::Serialize;

const COMPONENT: &str = "Database";

/// One entity that failed a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFailure {
    /// Index in the declared entity list.
    pub position: usize,
    pub entity: String,
    pub cause: String,
}

/// Aggregate of one walk over an entity list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_entities: Vec<EntityFailure>,
}

impl PassResult {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed_entities
            .iter()
            .map(|failure| failure.entity.as_str())
            .collect()
    }
}

#[derive(Clone, Copy)]
enum PassKind {
    Verify,
    Repair,
}

impl PassKind {
    fn success_message(self) -> &'static str {
        match self {
            Self::Verify => "verification finished!",
            Self::Repair => "correction completed!",
        }
    }

    fn summary_label(self) -> &'static str {
        match self {
            Self::Verify => "verification result",
            Self::Repair => "correction attempts",
        }
    }
}

/// Drives entity `sync` calls against one live connection.
pub struct Synchronizer<'a> {
    conn: &'a Connection,
    relationships: &'a RelationshipGraph,
    tables: &'a TableDirectory,
    logger: &'a dyn LogSink,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        conn: &'a Connection,
        relationships: &'a RelationshipGraph,
        tables: &'a TableDirectory,
        logger: &'a dyn LogSink,
    ) -> Self {
        Self {
            conn,
            relationships,
            tables,
            logger,
        }
    }

    /// First pass: every entity, in order, with the configured options.
    pub fn run_pass(
        &self,
        entities: &[Box<dyn EntityDescriptor>],
        options: SyncOptions,
    ) -> PassResult {
        let items = entities
            .iter()
            .enumerate()
            .map(|(position, entity)| (position, entity.as_ref()));
        self.walk(items, options, PassKind::Verify)
    }

    /// Repair pass: only the entities `first_pass` recorded as failed, in the
    /// order they failed, with alter-only options.
    pub fn repair(
        &self,
        entities: &[Box<dyn EntityDescriptor>],
        first_pass: &PassResult,
        verbose: bool,
    ) -> PassResult {
        let items = first_pass
            .failed_entities
            .iter()
            .filter_map(|failure| {
                entities
                    .get(failure.position)
                    .map(|entity| (failure.position, entity.as_ref()))
            });
        self.walk(items, SyncOptions::repair(verbose), PassKind::Repair)
    }

    fn walk<'e>(
        &self,
        items: impl Iterator<Item = (usize, &'e dyn EntityDescriptor)>,
        options: SyncOptions,
        kind: PassKind,
    ) -> PassResult {
        let ctx = SyncContext {
            conn: self.conn,
            options,
            relationships: self.relationships,
            tables: self.tables,
            logger: self.logger,
        };
        let mut result = PassResult::default();

        for (position, entity) in items {
            result.attempted += 1;
            match entity.sync(&ctx) {
                Ok(()) => {
                    result.succeeded += 1;
                    self.logger.info(
                        entity.name(),
                        LogCode::NotApplicable,
                        kind.success_message(),
                        None,
                    );
                }
                Err(err) => {
                    result.failed += 1;
                    self.logger
                        .error(entity.name(), LogCode::NotApplicable, "", Some(&err));
                    result.failed_entities.push(EntityFailure {
                        position,
                        entity: entity.name().to_string(),
                        cause: describe_cause(&err),
                    });
                }
            }
        }

        self.logger.info(
            COMPONENT,
            LogCode::NotApplicable,
            &format!(
                "{} => Success: {} | Errors: {} | Total: {}",
                kind.summary_label(),
                result.succeeded,
                result.failed,
                result.attempted
            ),
            None,
        );
        result
    }
}

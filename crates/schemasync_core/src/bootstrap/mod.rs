//! Startup schema bootstrap with self-healing repair.
//!
//! # Responsibility
//! - Authenticate, optionally wipe, verify and repair declared schemas.
//! - Restart the whole attempt when the store times out.
//! - Report one `Outcome` per bootstrap run.
//!
//! # Invariants
//! - The drop step, when enabled, completes before the first entity sync.
//! - Each entity is synced at most twice per attempt; repair runs at most once.
//! - Only a fatal connection error (or an exhausted retry bound) yields
//!   `Outcome::Failed`.
//!
//! # See also
//! - docs/architecture/bootstrap.md

use crate::db::{ConnectionManager, Connector};
use crate::log_sink::{CriticalError, LogCode, LogSink};
use crate::schema::{
    EntityDescriptor, RelationshipGraph, SyncOptions, TableDirectory, TableDropper,
};
use log::info;
use serde::Serialize;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use uuid::Uuid;

mod outcome;
mod pass;

pub use outcome::Outcome;
pub use pass::{EntityFailure, PassResult, Synchronizer};

const COMPONENT: &str = "Database";

/// Reconnect behavior on timeout-class connection failures.
///
/// The default retries forever without pausing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<NonZeroU32>,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_attempts: NonZeroU32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    fn allows_another(&self, attempts_so_far: u32) -> bool {
        self.max_attempts
            .map_or(true, |max| attempts_so_far < max.get())
    }
}

/// Switches consumed by one bootstrap run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub force_recreate: bool,
    pub allow_alter: bool,
    pub drop_all_tables: bool,
    pub verbose: bool,
    pub retry: RetryPolicy,
}

impl BootstrapOptions {
    fn first_pass(&self) -> SyncOptions {
        SyncOptions {
            force_recreate: self.force_recreate,
            allow_alter: self.allow_alter,
            verbose: self.verbose,
        }
    }
}

/// Result of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub run_id: Uuid,
    /// Number of authentication attempts made.
    pub attempts: u32,
    pub outcome: Outcome,
    pub first_pass: Option<PassResult>,
    pub repair_pass: Option<PassResult>,
    pub error: Option<CriticalError>,
}

impl BootstrapReport {
    /// Entities still failing after the run.
    pub fn unresolved(&self) -> Vec<&str> {
        match (&self.repair_pass, &self.first_pass) {
            (Some(repair), _) => repair.failed_names(),
            (None, Some(first)) => first.failed_names(),
            (None, None) => Vec::new(),
        }
    }

    /// Converts `Outcome::Failed` into the wrapped critical error.
    pub fn into_result(self) -> Result<Self, CriticalError> {
        if self.outcome != Outcome::Failed {
            return Ok(self);
        }
        Err(self.error.unwrap_or_else(|| CriticalError {
            component: COMPONENT.to_string(),
            code: LogCode::ServiceUnavailable,
            message: "schema bootstrap failed".to_string(),
            cause: None,
        }))
    }
}

/// Orchestrates connection, optional wipe, verification and repair.
pub struct Bootstrapper<C: Connector> {
    manager: ConnectionManager<C>,
    entities: Vec<Box<dyn EntityDescriptor>>,
    relationships: RelationshipGraph,
    tables: TableDirectory,
    options: BootstrapOptions,
    logger: Box<dyn LogSink>,
}

impl<C: Connector> Bootstrapper<C> {
    /// Takes ownership of a fully registered relationship graph; nothing can
    /// be registered once synchronization may start.
    pub fn new(
        connector: C,
        entities: Vec<Box<dyn EntityDescriptor>>,
        relationships: RelationshipGraph,
        options: BootstrapOptions,
        logger: Box<dyn LogSink>,
    ) -> Self {
        let tables = TableDirectory::from_entities(&entities);
        Self {
            manager: ConnectionManager::new(connector),
            entities,
            relationships,
            tables,
            options,
            logger,
        }
    }

    /// Runs the bootstrap until an outcome is reached.
    ///
    /// # Side effects
    /// - May drop every declared table when `drop_all_tables` is set.
    /// - Emits `schema_bootstrap` events plus sink records per entity.
    pub fn run(&mut self) -> BootstrapReport {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!("event=schema_bootstrap module=bootstrap status=start run_id={run_id}");

        let logger = &*self.logger;
        logger.info(COMPONENT, LogCode::NotApplicable, "Table verification started!", None);

        let mut attempts = 0u32;
        let report = loop {
            attempts += 1;
            let conn = match self.manager.authenticate(logger, self.options.verbose) {
                Ok(conn) => conn,
                Err(err) if err.is_timeout() && self.options.retry.allows_another(attempts) => {
                    logger.warn(
                        COMPONENT,
                        LogCode::NotApplicable,
                        "trying to connect to the database again!",
                        Some(&err),
                    );
                    if !self.options.retry.backoff.is_zero() {
                        std::thread::sleep(self.options.retry.backoff);
                    }
                    continue;
                }
                Err(err) => {
                    logger.error(
                        COMPONENT,
                        LogCode::NotApplicable,
                        "Error when trying to connect to the database!",
                        Some(&err),
                    );
                    let critical = logger.critical(
                        COMPONENT,
                        LogCode::ServiceUnavailable,
                        "schema bootstrap aborted",
                        Some(&err),
                    );
                    break BootstrapReport {
                        run_id,
                        attempts,
                        outcome: Outcome::Failed,
                        first_pass: None,
                        repair_pass: None,
                        error: Some(critical),
                    };
                }
            };

            if self.options.drop_all_tables {
                let dropper = TableDropper::new(conn, logger, self.options.verbose);
                match dropper.drop_all(&self.entities) {
                    Ok(()) => logger.warn(
                        COMPONENT,
                        LogCode::NotApplicable,
                        "drop all the table finished!",
                        None,
                    ),
                    Err(err) => logger.error(COMPONENT, LogCode::NotApplicable, "", Some(&err)),
                }
            }

            let synchronizer = Synchronizer::new(conn, &self.relationships, &self.tables, logger);
            let first_pass = synchronizer.run_pass(&self.entities, self.options.first_pass());

            let repair_pass = if first_pass.has_failures() {
                logger.error(
                    COMPONENT,
                    LogCode::NotApplicable,
                    &format!("{} errors in the models were found!", first_pass.failed),
                    None,
                );
                logger.warn(COMPONENT, LogCode::NotApplicable, "trying to fix the models", None);
                Some(synchronizer.repair(&self.entities, &first_pass, self.options.verbose))
            } else {
                None
            };

            let outcome = Outcome::aggregate(&first_pass, repair_pass.as_ref());
            logger.info(
                COMPONENT,
                LogCode::NotApplicable,
                &format!("Table verification {outcome}!"),
                None,
            );
            break BootstrapReport {
                run_id,
                attempts,
                outcome,
                first_pass: Some(first_pass),
                repair_pass,
                error: None,
            };
        };

        if report.outcome == Outcome::SuccessWithErrors {
            logger.warn(
                COMPONENT,
                LogCode::NotApplicable,
                &format!(
                    "starting with unresolved schema errors in [{}]",
                    report.unresolved().join(", ")
                ),
                None,
            );
        }

        info!(
            "event=schema_bootstrap module=bootstrap status={} run_id={} attempts={} duration_ms={}",
            outcome_status(report.outcome),
            run_id,
            report.attempts,
            started_at.elapsed().as_millis()
        );
        report
    }

    /// Hands the authenticated connection to the application layer.
    pub fn into_connection(self) -> Option<rusqlite::Connection> {
        self.manager.into_connection()
    }
}

fn outcome_status(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "ok",
        Outcome::Recovered => "recovered",
        Outcome::SuccessWithErrors => "partial",
        Outcome::Failed => "error",
    }
}

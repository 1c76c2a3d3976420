//! SQLite connector used by the bootstrap sequence.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by schema materialization.
//! - Ping the session before handing it out.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have answered a `SELECT 1` ping.
//!
//! # See also
//! - docs/architecture/logging.md

use super::{ConnectionError, Connector};
use crate::log_sink::{LogCode, LogSink};
use log::{error, info};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const AUTH_COMPONENT: &str = "Authenticate";
const PING_SQL: &str = "SELECT 1;";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the SQLite store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    File(PathBuf),
    Memory,
}

impl DbTarget {
    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// Connector that opens one SQLite session per call.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: DbTarget,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new(target: DbTarget) -> Self {
        Self {
            target,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DbTarget::Memory)
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn target(&self) -> &DbTarget {
        &self.target
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        match &self.target {
            DbTarget::File(path) => Connection::open(path),
            DbTarget::Memory => Connection::open_in_memory(),
        }
    }
}

impl Connector for SqliteConnector {
    /// Opens and pings a SQLite session.
    ///
    /// # Side effects
    /// - Emits `db_open` logging events with duration and status.
    /// - Forwards the ping statement to `logger` when `verbose` is set.
    fn connect(
        &mut self,
        logger: &dyn LogSink,
        verbose: bool,
    ) -> Result<Connection, ConnectionError> {
        let started_at = Instant::now();
        let mode = self.target.mode();
        info!("event=db_open module=db status=start mode={mode}");

        let conn = match self.open() {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match configure_and_ping(&conn, self.busy_timeout, logger, verbose) {
            Ok(()) => {
                info!(
                    "event=db_open module=db status=ok mode={} duration_ms={}",
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(conn)
            }
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={} duration_ms={} error_code=db_ping_failed error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }
}

fn configure_and_ping(
    conn: &Connection,
    busy_timeout: Duration,
    logger: &dyn LogSink,
    verbose: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if verbose {
        logger.info(AUTH_COMPONENT, LogCode::NotApplicable, PING_SQL, None);
    }
    conn.query_row(PING_SQL, [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

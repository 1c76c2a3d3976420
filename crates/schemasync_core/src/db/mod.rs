//! Store connection ownership and failure classification.
//!
//! # Responsibility
//! - Open and authenticate the single store connection for one process.
//! - Classify connection failures as retryable (timeout) or fatal.
//!
//! # Invariants
//! - At most one live connection is held by a `ConnectionManager`.
//! - A reconnect always drops the previous handle before opening a new one.
//!
//! # See also
//! - docs/architecture/bootstrap.md

use crate::log_sink::{LogCode, LogSink};
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;

pub use open::{DbTarget, SqliteConnector};

const COMPONENT: &str = "Database";

/// Retry classification for a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Store was unreachable or busy; the whole attempt may be restarted.
    Timeout,
    /// Anything else; bootstrap must abort.
    Fatal,
}

#[derive(Debug)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    message: String,
    source: Option<rusqlite::Error>,
}

impl ConnectionError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectionErrorKind::Timeout,
            message: message.into(),
            source: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectionErrorKind::Fatal,
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ConnectionErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ConnectionErrorKind::Timeout
    }
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ConnectionErrorKind::Timeout => write!(f, "connection timed out: {}", self.message),
            ConnectionErrorKind::Fatal => write!(f, "connection failed: {}", self.message),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|err| err as &(dyn Error + 'static))
    }
}

impl From<rusqlite::Error> for ConnectionError {
    fn from(value: rusqlite::Error) -> Self {
        let (kind, message) = match value.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                (ConnectionErrorKind::Timeout, "database is busy")
            }
            _ => (ConnectionErrorKind::Fatal, "sqlite error"),
        };
        Self {
            kind,
            message: message.to_string(),
            source: Some(value),
        }
    }
}

/// Opens raw store sessions.
///
/// Implemented by the SQLite connector and by test doubles.
pub trait Connector {
    fn connect(
        &mut self,
        logger: &dyn LogSink,
        verbose: bool,
    ) -> Result<Connection, ConnectionError>;
}

/// Owns the process-wide store connection.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    handle: Option<Connection>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: None,
        }
    }

    /// Opens a fresh session, replacing any previous one.
    ///
    /// # Side effects
    /// - Logs `Connection established successfully!` on success.
    /// - Does not log failures; the caller decides retry vs abort.
    pub fn authenticate(
        &mut self,
        logger: &dyn LogSink,
        verbose: bool,
    ) -> Result<&Connection, ConnectionError> {
        // Drop the old handle first so a failed reconnect never leaves a stale
        // session behind.
        self.handle = None;
        let conn = self.connector.connect(logger, verbose)?;
        logger.info(
            COMPONENT,
            LogCode::NotApplicable,
            "Connection established successfully!",
            None,
        );
        Ok(&*self.handle.insert(conn))
    }

    /// Hands the live connection over to the application layer.
    pub fn into_connection(self) -> Option<Connection> {
        self.handle
    }
}

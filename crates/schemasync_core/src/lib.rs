//! Startup schema bootstrap and self-healing synchronizer.
//! Reconciles declared entity schemas against the live store before the
//! application serves requests.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod db;
pub mod log_sink;
pub mod logging;
pub mod schema;

pub use bootstrap::{
    BootstrapOptions, BootstrapReport, Bootstrapper, EntityFailure, Outcome, PassResult,
    RetryPolicy, Synchronizer,
};
pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use db::{
    ConnectionError, ConnectionErrorKind, ConnectionManager, Connector, DbTarget, SqliteConnector,
};
pub use log_sink::{CriticalError, LogCode, LogSink, StructuredLogSink};
pub use logging::{default_log_level, init_console_logging, init_logging, logging_status, LogTarget};
pub use schema::{
    Column, ColumnType, DropError, EntityDescriptor, GraphError, Relationship, RelationshipGraph,
    RelationshipKind, SyncContext, SyncError, SyncOptions, TableDirectory, TableDropper,
    TableSchema,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

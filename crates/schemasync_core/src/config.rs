//! Bootstrap configuration file loading.
//!
//! # Responsibility
//! - Parse the `Database` section of the JSON application config.
//! - Translate it into `BootstrapOptions` and a SQLite connector.
//!
//! # Invariants
//! - Every key is optional; missing keys fall back to non-destructive defaults.
//! - Legacy key names (`ForceSync`, `AlterSync`, `DropAllTable`, `IsLogger`)
//!   are accepted alongside camelCase names.

use crate::bootstrap::{BootstrapOptions, RetryPolicy};
use crate::db::{DbTarget, SqliteConnector};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, .. } => write!(f, "failed to read config `{}`", path.display()),
            Self::Parse(_) => f.write_str("invalid config"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level application config; only the database section is consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "Database", alias = "database", default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    #[serde(alias = "ForceSync")]
    pub force_recreate: bool,
    #[serde(alias = "AlterSync")]
    pub allow_alter: bool,
    #[serde(alias = "DropAllTable")]
    pub drop_all_tables: bool,
    #[serde(alias = "IsLogger")]
    pub verbose: bool,
    /// SQLite file; `None` means an in-memory store.
    pub storage: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    /// `None` or `0` keeps the unbounded retry contract.
    pub max_connect_attempts: Option<u32>,
    pub reconnect_backoff_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            force_recreate: false,
            allow_alter: false,
            drop_all_tables: false,
            verbose: false,
            storage: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_connect_attempts: None,
            reconnect_backoff_ms: 0,
        }
    }
}

impl DatabaseConfig {
    pub fn bootstrap_options(&self) -> BootstrapOptions {
        let backoff = Duration::from_millis(self.reconnect_backoff_ms);
        let retry = match self.max_connect_attempts.and_then(NonZeroU32::new) {
            Some(max) => RetryPolicy::bounded(max, backoff),
            None => RetryPolicy {
                max_attempts: None,
                backoff,
            },
        };
        BootstrapOptions {
            force_recreate: self.force_recreate,
            allow_alter: self.allow_alter,
            drop_all_tables: self.drop_all_tables,
            verbose: self.verbose,
            retry,
        }
    }

    pub fn connector(&self) -> SqliteConnector {
        let target = match &self.storage {
            Some(path) => DbTarget::File(path.clone()),
            None => DbTarget::Memory,
        };
        SqliteConnector::new(target).with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

impl AppConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }
}

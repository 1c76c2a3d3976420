//! Structured log sink consumed by the bootstrap sequence.
//!
//! # Responsibility
//! - Define the `info/warn/error/critical` collaborator contract.
//! - Provide the default sink that forwards records to the `log` facade.
//!
//! # Invariants
//! - Sinks never panic and never fail; `critical` always yields an error value.
//! - Emitted lines keep the stable `event=... module=...` key/value layout.
//!
//! # See also
//! - docs/architecture/logging.md

use crate::logging::sanitize_message;
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_CAUSE_CHARS: usize = 512;

/// Status code attached to every log record.
///
/// Mirrors the HTTP-status vocabulary used by the service layer so bootstrap
/// records can be correlated with request logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCode {
    NotApplicable,
    ServiceUnavailable,
}

impl LogCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotApplicable => "n/a",
            Self::ServiceUnavailable => "503",
        }
    }
}

impl Display for LogCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapped error returned by [`LogSink::critical`].
///
/// Carries enough context to reject a caller's startup future without the
/// caller having to re-log the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalError {
    pub component: String,
    pub code: LogCode,
    pub message: String,
    pub cause: Option<String>,
}

impl Display for CriticalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.component, self.message, self.code)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl Error for CriticalError {}

/// Logger collaborator used by every bootstrap component.
pub trait LogSink {
    fn info(&self, component: &str, code: LogCode, message: &str, cause: Option<&dyn Error>);
    fn warn(&self, component: &str, code: LogCode, message: &str, cause: Option<&dyn Error>);
    fn error(&self, component: &str, code: LogCode, message: &str, cause: Option<&dyn Error>);

    /// Logs at error severity and returns a wrapped error for propagation.
    fn critical(
        &self,
        component: &str,
        code: LogCode,
        message: &str,
        cause: Option<&dyn Error>,
    ) -> CriticalError;
}

/// Default sink writing through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredLogSink;

impl StructuredLogSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for StructuredLogSink {
    fn info(&self, component: &str, code: LogCode, message: &str, cause: Option<&dyn Error>) {
        info!(
            "event=bootstrap_log module=schemasync component={} code={} message={}{}",
            component,
            code,
            sanitize(message),
            cause_suffix(cause)
        );
    }

    fn warn(&self, component: &str, code: LogCode, message: &str, cause: Option<&dyn Error>) {
        warn!(
            "event=bootstrap_log module=schemasync component={} code={} message={}{}",
            component,
            code,
            sanitize(message),
            cause_suffix(cause)
        );
    }

    fn error(&self, component: &str, code: LogCode, message: &str, cause: Option<&dyn Error>) {
        error!(
            "event=bootstrap_log module=schemasync component={} code={} message={}{}",
            component,
            code,
            sanitize(message),
            cause_suffix(cause)
        );
    }

    fn critical(
        &self,
        component: &str,
        code: LogCode,
        message: &str,
        cause: Option<&dyn Error>,
    ) -> CriticalError {
        error!(
            "event=bootstrap_critical module=schemasync component={} code={} message={}{}",
            component,
            code,
            sanitize(message),
            cause_suffix(cause)
        );
        CriticalError {
            component: component.to_string(),
            code,
            message: message.to_string(),
            cause: cause.map(describe_cause),
        }
    }
}

/// Flattens an error and its source chain into one line.
///
/// A link whose text the previous link already ends with is skipped; the
/// SQLite driver reports its error code both as `Display` and as `source`.
pub fn describe_cause(cause: &dyn Error) -> String {
    let mut text = cause.to_string();
    let mut source = cause.source();
    while let Some(inner) = source {
        let segment = inner.to_string();
        if !segment.is_empty() && !text.ends_with(&segment) {
            text.push_str(": ");
            text.push_str(&segment);
        }
        source = inner.source();
    }
    text
}

fn cause_suffix(cause: Option<&dyn Error>) -> String {
    match cause {
        Some(err) => format!(" error={}", sanitize(&describe_cause(err))),
        None => String::new(),
    }
}

fn sanitize(value: &str) -> String {
    sanitize_message(value, MAX_CAUSE_CHARS)
}

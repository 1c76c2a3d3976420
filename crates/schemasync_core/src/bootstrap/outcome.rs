//! Final bootstrap outcome.

use super::pass::PassResult;
use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First pass had no failures.
    Success,
    /// Repair pass fixed every first-pass failure.
    Recovered,
    /// Some entities are still broken; the process may still start.
    SuccessWithErrors,
    /// No connection could be established; no pass ran.
    Failed,
}

impl Outcome {
    /// Aggregates the two pass results.
    ///
    /// `repair` is ignored when `first` has no failures. A first pass with
    /// failures and no repair result counts as unrecovered.
    pub fn aggregate(first: &PassResult, repair: Option<&PassResult>) -> Self {
        if !first.has_failures() {
            return Self::Success;
        }
        match repair {
            Some(repair) if !repair.has_failures() => Self::Recovered,
            _ => Self::SuccessWithErrors,
        }
    }

    /// Whether the application may start with this outcome.
    pub fn is_startable(self) -> bool {
        !matches!(self, Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "finished successfully",
            Self::Recovered => "finished successfully and corrected the errors",
            Self::SuccessWithErrors => "finished with errors",
            Self::Failed => "failed",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

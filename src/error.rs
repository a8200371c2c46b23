//! Structured error handling and exit codes.

use serde::Serialize;

use crate::batch::BatchInputError;
use crate::config::ConfigError;
use crate::connect::ConnectError;
use crate::import::ImportError;
use crate::lorawan::crypto::PayloadError;
use crate::restore::dump::CutoffError;

/// Exit codes for the session-wrench application.
///
/// - 0: Success (every requested device was restored)
/// - 1: General error (unexpected failure)
/// - 2: Nothing restored (completed, but no session was created)
/// - 3: Partial success (some devices were restored)
/// - 4: Invalid input (bad device list, CSV, flag value or configuration)
/// - 5: Connectivity error (a dependency was unreachable at startup)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed fully.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Nothing restored: no session was created.
    NothingRestored = 2,
    /// Partial success: some devices were skipped or failed.
    PartialSuccess = 3,
    /// Invalid input: the run was rejected before touching any store.
    InvalidInput = 4,
    /// Connectivity error: a store or database could not be reached.
    ConnectivityError = 5,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SW000",
            Self::GeneralError => "SW001",
            Self::NothingRestored => "SW002",
            Self::PartialSuccess => "SW003",
            Self::InvalidInput => "SW004",
            Self::ConnectivityError => "SW005",
        }
    }

    /// Exit code for a fatal error returned by `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<ConnectError>().is_some() {
            Self::ConnectivityError
        } else if err.downcast_ref::<BatchInputError>().is_some()
            || err
                .downcast_ref::<ImportError>()
                .is_some_and(|e| !matches!(e, ImportError::Store(_)))
            || err.downcast_ref::<CutoffError>().is_some()
            || err.downcast_ref::<ConfigError>().is_some()
            || err.downcast_ref::<hex::FromHexError>().is_some()
            || err.downcast_ref::<PayloadError>().is_some()
        {
            Self::InvalidInput
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "SW001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Messages of the underlying causes, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}

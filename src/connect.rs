//! Startup connection loop.
//!
//! Dependencies are retried a bounded number of times with a fixed delay
//! between attempts. Failures classified as fatal (rejected credentials, bad
//! addresses) end the loop at once.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::sources::SourceError;
use crate::store::BackendError;

/// Retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one is always made.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            delay: Duration::from_secs(2),
        }
    }
}

/// A dependency could not be reached.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Retrying cannot help.
    #[error("{name}: {reason}")]
    Fatal {
        /// Dependency name
        name: String,
        /// Failure description
        reason: String,
    },

    /// Every attempt failed.
    #[error("{name}: unreachable after {attempts} attempt(s): {last_error}")]
    Exhausted {
        /// Dependency name
        name: String,
        /// Attempts made
        attempts: u32,
        /// Last failure description
        last_error: String,
    },
}

/// Classifies connection failures.
pub trait RetryClass: Display {
    /// Whether the failure ends the retry loop immediately.
    fn is_fatal(&self) -> bool;
}

impl RetryClass for BackendError {
    fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

impl RetryClass for SourceError {
    fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidData { .. })
    }
}

/// Call `attempt` until it succeeds, fails fatally, or `policy` runs out.
pub fn connect_with_retry<T, E, F>(name: &str, policy: &RetryPolicy, mut attempt: F) -> Result<T, ConnectError>
where
    E: RetryClass,
    F: FnMut() -> Result<T, E>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for n in 1..=attempts {
        match attempt() {
            Ok(value) => {
                log::info!("{}: connected", name);
                return Ok(value);
            }
            Err(e) if e.is_fatal() => {
                return Err(ConnectError::Fatal {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                last_error = e.to_string();
                if n < attempts {
                    log::warn!(
                        "{}: {} (attempt {}/{}), retrying in {:?}",
                        name,
                        last_error,
                        n,
                        attempts,
                        policy.delay
                    );
                    thread::sleep(policy.delay);
                }
            }
        }
    }

    Err(ConnectError::Exhausted {
        name: name.to_string(),
        attempts,
        last_error,
    })
}

//! Batch driver for the restore commands.
//!
//! A batch is a text file with one DevEUI per line. The whole file is parsed
//! before anything else happens; a single bad line rejects the batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::error::ExitCode;
use crate::lorawan::{Eui64, IdParseError};
use crate::progress::ProgressCallback;
use crate::restore::{create_sessions, CreateError, Reconciler};
use crate::store::SessionStore;

/// The device list could not be used.
#[derive(Debug, Error)]
pub enum BatchInputError {
    /// File unreadable.
    #[error("cannot read device list {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Line without an identifier.
    #[error("line {line}: empty line in device list")]
    BlankLine {
        /// 1-based line number
        line: usize,
    },

    /// Line that is not a DevEUI.
    #[error("line {line}: invalid DevEUI '{content}': {source}")]
    InvalidLine {
        /// 1-based line number
        line: usize,
        /// Line as read
        content: String,
        /// Parse failure
        #[source]
        source: IdParseError,
    },

    /// No identifiers at all.
    #[error("device list is empty")]
    Empty,
}

/// Strip a legacy `\x` escape prefix and inner spaces from a list line.
fn normalize_line(line: &str) -> String {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.trim_start_matches(['\\', 'x']).to_string()
}

/// Parse a newline-delimited DevEUI list.
pub fn parse_device_list(text: &str) -> Result<Vec<Eui64>, BatchInputError> {
    let mut devices = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let id = normalize_line(raw);
        if id.is_empty() {
            return Err(BatchInputError::BlankLine { line });
        }
        let eui = id.parse::<Eui64>().map_err(|source| BatchInputError::InvalidLine {
            line,
            content: raw.to_string(),
            source,
        })?;
        devices.push(eui);
    }

    if devices.is_empty() {
        return Err(BatchInputError::Empty);
    }
    Ok(devices)
}

/// Read and parse a device list file.
pub fn read_device_list(path: &Path) -> Result<Vec<Eui64>, BatchInputError> {
    let text = fs::read_to_string(path).map_err(|source| BatchInputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let devices = parse_device_list(&text)?;
    log::info!("{} device(s) read from {}", devices.len(), path.display());
    Ok(devices)
}

/// Aggregate counts of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub mode: String,
    pub attempted: usize,
    pub reconciled: usize,
    pub created: usize,
    pub already_exists: usize,
    pub create_failures: usize,
    pub index_write_failures: usize,
    /// Skips of the reconcile phase by reason label.
    pub skipped: BTreeMap<String, usize>,
}

impl BatchReport {
    /// Exit status summarizing the run.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.created == 0 {
            ExitCode::NothingRestored
        } else if self.created == self.attempted {
            ExitCode::Success
        } else {
            ExitCode::PartialSuccess
        }
    }

    /// Devices skipped during reconciliation.
    #[must_use]
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    /// Log the report, one line per figure.
    pub fn log_summary(&self) {
        log::info!("{}: attempted {}", self.mode, self.attempted);
        log::info!("{}: reconciled {}", self.mode, self.reconciled);
        log::info!(
            "{}: created {} (already existed {}, failed {}, index write failures {})",
            self.mode,
            self.created,
            self.already_exists,
            self.create_failures,
            self.index_write_failures
        );
        for (reason, count) in &self.skipped {
            log::info!("{}: skipped {} {}", self.mode, count, reason);
        }
    }
}

/// Reconcile `devices`, then create the resulting sessions in `store`.
pub fn run_batch(
    reconciler: &dyn Reconciler,
    store: &SessionStore,
    devices: &[Eui64],
    progress: &dyn ProgressCallback,
) -> BatchReport {
    let outcome = reconciler.reconcile_all(devices, progress);

    let mut report = BatchReport {
        mode: reconciler.mode().to_string(),
        attempted: devices.len(),
        reconciled: outcome.records.len(),
        skipped: outcome
            .skipped_by_reason()
            .into_iter()
            .map(|(reason, count)| (reason.label().to_string(), count))
            .collect(),
        ..Default::default()
    };

    match create_sessions(store, &outcome.records, progress) {
        Ok(created) => {
            report.created = created.created;
            report.already_exists = created.already_exists;
            report.create_failures = created.failed;
            report.index_write_failures = created.index_write_failures;
        }
        Err(e @ CreateError::NothingToRestore) => log::error!("{}", e),
    }

    report.log_summary();
    report
}

//! Write reconciled sessions without overwriting existing ones.

use serde::Serialize;
use thiserror::Error;

use crate::progress::{ProgressCallback, PHASE_CREATE};
use crate::session::SessionRecord;
use crate::store::{SessionStore, StoreError};

/// Create-phase failures that end the run.
#[derive(Debug, Error)]
pub enum CreateError {
    /// Reconciliation produced no records.
    #[error("Not a single session has been assembled. Nothing to restore")]
    NothingToRestore,
}

/// Counts of the create phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    /// Records saved.
    pub created: usize,
    /// Records left alone because the store already had one.
    pub already_exists: usize,
    /// Records that could not be checked or saved.
    pub failed: usize,
    /// Saved records whose address index write failed.
    pub index_write_failures: usize,
}

/// Save every record the store does not already have.
///
/// A record is written only after a `get` confirms the device has no session.
/// Running this twice over the same records leaves the store as after the
/// first run. After each save the device's MAC-command queue is flushed.
pub fn create_sessions(
    store: &SessionStore,
    records: &[SessionRecord],
    progress: &dyn ProgressCallback,
) -> Result<CreateReport, CreateError> {
    if records.is_empty() {
        return Err(CreateError::NothingToRestore);
    }

    progress.on_phase_start(PHASE_CREATE, records.len());
    let mut report = CreateReport::default();

    for (i, record) in records.iter().enumerate() {
        let dev_eui = record.dev_eui;
        progress.on_progress(i + 1, &dev_eui.to_string());

        match store.get(&dev_eui) {
            Ok(_) => {
                log::warn!("dev_eui={} device-session already exists, not overwriting", dev_eui);
                report.already_exists += 1;
                continue;
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                log::error!("dev_eui={} existence check failed: {}", dev_eui, e);
                report.failed += 1;
                continue;
            }
        }

        let outcome = match store.save(record) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("dev_eui={} save failed: {}", dev_eui, e);
                report.failed += 1;
                continue;
            }
        };
        if !outcome.is_complete() {
            report.index_write_failures += 1;
        }
        report.created += 1;
        log::info!("dev_eui={} device-session created", dev_eui);

        if let Err(e) = store.flush_mac_command_queue(&dev_eui) {
            log::warn!("dev_eui={} mac-command queue not flushed: {}", dev_eui, e);
        }
    }

    progress.on_phase_end(PHASE_CREATE);
    log::info!(
        "created {} out of {} ({} already existed, {} failed)",
        report.created,
        records.len(),
        report.already_exists,
        report.failed
    );
    Ok(report)
}

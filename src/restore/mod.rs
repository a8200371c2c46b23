//! Session reconstruction.
//!
//! Two strategies rebuild a [`SessionRecord`] for a device whose session is
//! missing from the store:
//!
//! * [`cold::ColdRebuild`] assembles it from the server databases and the
//!   frame log
//! * [`dump::DumpRecovery`] starts from an older copy of the store and only
//!   refreshes the counters
//!
//! Both process devices one at a time and skip a device on any failure,
//! recording why. [`create::create_sessions`] then writes the results without
//! overwriting existing sessions.

pub mod cold;
pub mod create;
pub mod dump;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::lorawan::band::{Band, Channel};
use crate::lorawan::Eui64;
use crate::progress::{ProgressCallback, PHASE_RECONCILE};
use crate::session::SessionRecord;

pub use cold::ColdRebuild;
pub use create::{create_sessions, CreateError, CreateReport};
pub use dump::DumpRecovery;

/// Why a device was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Not in the application-server database.
    UnknownApplicationDevice,
    /// Not in the network-server database.
    UnknownNetworkDevice,
    /// Device profile missing.
    UnknownDeviceProfile,
    /// Never joined.
    NoActivation,
    /// Application server and last join disagree on the DevAddr.
    AddressMismatch,
    /// No logged uplink or downlink.
    NoTraffic,
    /// A source lookup failed for a reason other than a missing row.
    SourceError,
    /// The store already holds a session.
    SessionExists,
    /// The dump has no session for the device.
    NoHistoricalCopy,
    /// The device joined after the dump was taken.
    NewerJoinExists,
    /// Reading a store failed.
    StoreError,
}

impl SkipReason {
    /// Stable label used in reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UnknownApplicationDevice => "unknown_application_device",
            Self::UnknownNetworkDevice => "unknown_network_device",
            Self::UnknownDeviceProfile => "unknown_device_profile",
            Self::NoActivation => "no_activation",
            Self::AddressMismatch => "address_mismatch",
            Self::NoTraffic => "no_traffic",
            Self::SourceError => "source_error",
            Self::SessionExists => "session_exists",
            Self::NoHistoricalCopy => "no_historical_copy",
            Self::NewerJoinExists => "newer_join_exists",
            Self::StoreError => "store_error",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Records built by a reconciliation pass and the devices it skipped.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Built records, in input order.
    pub records: Vec<SessionRecord>,
    /// Skipped devices, in input order.
    pub skipped: Vec<(Eui64, SkipReason)>,
}

impl ReconcileOutcome {
    /// Skip counts per reason.
    #[must_use]
    pub fn skipped_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for (_, reason) in &self.skipped {
            *counts.entry(*reason).or_insert(0) += 1;
        }
        counts
    }
}

/// A per-device reconstruction strategy.
pub trait Reconciler {
    /// Short name used in logs and reports.
    fn mode(&self) -> &'static str;

    /// Build the record for one device or say why not.
    fn reconcile(&self, dev_eui: &Eui64) -> Result<SessionRecord, SkipReason>;

    /// Reconcile every device in order. One device's failure never stops the pass.
    fn reconcile_all(&self, devices: &[Eui64], progress: &dyn ProgressCallback) -> ReconcileOutcome {
        progress.on_phase_start(PHASE_RECONCILE, devices.len());
        let mut outcome = ReconcileOutcome::default();
        for (i, dev_eui) in devices.iter().enumerate() {
            progress.on_progress(i + 1, &dev_eui.to_string());
            match self.reconcile(dev_eui) {
                Ok(record) => outcome.records.push(record),
                Err(reason) => outcome.skipped.push((*dev_eui, reason)),
            }
        }
        progress.on_phase_end(PHASE_RECONCILE);

        log::info!(
            "{}: prepared {} out of {}",
            self.mode(),
            outcome.records.len(),
            devices.len()
        );
        outcome
    }
}

/// Enabled channels and extra channels for a fresh session on `band`.
///
/// Starts from the region's default channels and appends every CFList
/// frequency that resolves to a configured extra channel. Unresolvable
/// frequencies are logged and left out.
#[must_use]
pub fn channel_state(band: &Band) -> (Vec<u32>, BTreeMap<u32, Channel>) {
    let mut enabled = band.standard_uplink_channel_indices();
    let mut extra = BTreeMap::new();

    let Some(cf_list) = band.cf_list() else {
        return (enabled, extra);
    };

    for freq in cf_list.into_iter().filter(|f| *f != 0) {
        let index = match band.uplink_channel_index(freq, false) {
            Ok(i) => i,
            Err(e) => {
                log::error!("unknown cflist frequency {}: {}", freq, e);
                continue;
            }
        };
        match band.uplink_channel(index) {
            Ok(channel) => {
                enabled.push(index);
                extra.insert(index, channel);
            }
            Err(e) => log::error!("cflist channel {} unusable: {}", index, e),
        }
    }
    (enabled, extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::band::BandName;

    #[test]
    fn test_channel_state_without_extras() {
        let band = Band::new(BandName::Eu868);
        let (enabled, extra) = channel_state(&band);
        assert_eq!(enabled, vec![0, 1, 2]);
        assert!(extra.is_empty());
    }

    #[test]
    fn test_channel_state_skips_unresolvable() {
        let extras = [
            Channel {
                frequency: 864_100_000,
                min_dr: 0,
                max_dr: 5,
            },
            Channel {
                frequency: 433_175_000,
                min_dr: 0,
                max_dr: 5,
            },
        ];
        let band = Band::with_extra_channels(BandName::Ru864, &extras);
        let (enabled, extra) = channel_state(&band);
        assert_eq!(enabled, vec![0, 1, 2]);
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[&2].frequency, 864_100_000);
    }

    #[test]
    fn test_skip_reason_labels() {
        assert_eq!(SkipReason::NoTraffic.label(), "no_traffic");
        assert_eq!(SkipReason::NewerJoinExists.to_string(), "newer_join_exists");
        assert_eq!(
            serde_json::to_string(&SkipReason::AddressMismatch).unwrap(),
            "\"address_mismatch\""
        );
    }

    #[test]
    fn test_skipped_by_reason() {
        let outcome = ReconcileOutcome {
            records: Vec::new(),
            skipped: vec![
                (Eui64([1; 8]), SkipReason::NoTraffic),
                (Eui64([2; 8]), SkipReason::NoTraffic),
                (Eui64([3; 8]), SkipReason::NoActivation),
            ],
        };
        let counts = outcome.skipped_by_reason();
        assert_eq!(counts[&SkipReason::NoTraffic], 2);
        assert_eq!(counts[&SkipReason::NoActivation], 1);
    }
}

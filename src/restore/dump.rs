//! Recover sessions from an older copy of the store.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::context::Context;
use crate::lorawan::Eui64;
use crate::session::SessionRecord;
use crate::sources::{Direction, FrameLog, IdentitySource, SourceError};
use crate::store::{SessionStore, StoreError};

use super::{Reconciler, SkipReason};

/// Format of `--dump-datetime`.
pub const CUTOFF_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// The dump timestamp could not be parsed.
#[derive(Debug, Error)]
#[error("invalid dump datetime '{input}', expected YYYY-MM-DD HH:MM:SS +ZZZZ: {source}")]
pub struct CutoffError {
    /// Rejected text
    pub input: String,
    /// Parser failure
    #[source]
    pub source: chrono::ParseError,
}

/// Parse a dump timestamp such as `2024-03-01 10:00:00 +0300`.
pub fn parse_cutoff(input: &str) -> Result<DateTime<Utc>, CutoffError> {
    DateTime::parse_from_str(input.trim(), CUTOFF_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| CutoffError {
            input: input.to_string(),
            source,
        })
}

/// Takes a device's session from the dump unless the device re-joined since.
///
/// No DevAddr agreement check is made: the dump's key material is trusted as
/// long as no join happened after `cutoff`. Logged frames refresh the
/// counters when present; otherwise the dump's counters are kept.
pub struct DumpRecovery<'a> {
    primary: &'a SessionStore,
    dump: &'a SessionStore,
    identity: &'a dyn IdentitySource,
    frames: &'a dyn FrameLog,
    cutoff: DateTime<Utc>,
}

impl<'a> DumpRecovery<'a> {
    #[must_use]
    pub fn new(
        primary: &'a SessionStore,
        dump: &'a SessionStore,
        identity: &'a dyn IdentitySource,
        frames: &'a dyn FrameLog,
        cutoff: DateTime<Utc>,
    ) -> Self {
        Self {
            primary,
            dump,
            identity,
            frames,
            cutoff,
        }
    }

    /// `None` when the context has no dump store attached.
    #[must_use]
    pub fn from_context(ctx: &'a Context, cutoff: DateTime<Utc>) -> Option<Self> {
        let dump = ctx.dump_store.as_ref()?;
        Some(Self::new(
            &ctx.store,
            dump,
            ctx.identity.as_ref(),
            ctx.frame_log.as_ref(),
            cutoff,
        ))
    }

    /// Cutoff in use.
    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    fn refresh_counters(&self, record: &mut SessionRecord) -> Result<(), SkipReason> {
        let dev_eui = record.dev_eui;

        match self.frames.last_frame(&dev_eui, Direction::Rx) {
            Ok(rx) => record.f_cnt_up = rx.f_cnt_up.saturating_add(1),
            Err(SourceError::NotFound) => {
                log::debug!("dev_eui={} no logged uplink, keeping f_cnt_up={}", dev_eui, record.f_cnt_up);
            }
            Err(e) => {
                log::error!("dev_eui={} skipped: logged uplink lookup failed: {}", dev_eui, e);
                return Err(SkipReason::SourceError);
            }
        }

        match self.frames.last_frame(&dev_eui, Direction::Tx) {
            Ok(tx) => {
                if record.is_lorawan_1_0() {
                    record.n_f_cnt_down = tx.n_f_cnt_down.saturating_add(1);
                } else {
                    record.a_f_cnt_down = tx.a_f_cnt_down.saturating_add(1);
                }
            }
            Err(SourceError::NotFound) => {
                log::debug!(
                    "dev_eui={} no logged downlink, keeping downlink counter {}",
                    dev_eui,
                    record.downlink_counter()
                );
            }
            Err(e) => {
                log::error!("dev_eui={} skipped: logged downlink lookup failed: {}", dev_eui, e);
                return Err(SkipReason::SourceError);
            }
        }
        Ok(())
    }
}

impl Reconciler for DumpRecovery<'_> {
    fn mode(&self) -> &'static str {
        "restore-from-dump"
    }

    fn reconcile(&self, dev_eui: &Eui64) -> Result<SessionRecord, SkipReason> {
        match self.primary.get(dev_eui) {
            Ok(_) => {
                log::info!("dev_eui={} skipped: device-session already exists", dev_eui);
                return Err(SkipReason::SessionExists);
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                log::error!("dev_eui={} skipped: {}", dev_eui, e);
                return Err(SkipReason::StoreError);
            }
        }

        let mut record = match self.dump.get(dev_eui) {
            Ok(r) => r,
            Err(StoreError::NotFound(_)) => {
                log::info!("dev_eui={} skipped: no device-session in dump", dev_eui);
                return Err(SkipReason::NoHistoricalCopy);
            }
            Err(e) => {
                log::error!("dev_eui={} skipped: dump read failed: {}", dev_eui, e);
                return Err(SkipReason::StoreError);
            }
        };
        record.dev_eui = *dev_eui;

        match self.identity.last_activation(dev_eui) {
            Ok(activation) if activation.created_at > self.cutoff => {
                log::info!(
                    "dev_eui={} skipped: joined at {} after dump taken at {}",
                    dev_eui,
                    activation.created_at,
                    self.cutoff
                );
                return Err(SkipReason::NewerJoinExists);
            }
            Ok(_) | Err(SourceError::NotFound) => {}
            Err(e) => {
                log::error!("dev_eui={} skipped: activation lookup failed: {}", dev_eui, e);
                return Err(SkipReason::SourceError);
            }
        }

        self.refresh_counters(&mut record)?;

        log::debug!(
            "dev_eui={} recovered from dump: dev_addr={} f_cnt_up={} downlink={}",
            dev_eui,
            record.dev_addr,
            record.f_cnt_up,
            record.downlink_counter()
        );
        Ok(record)
    }
}

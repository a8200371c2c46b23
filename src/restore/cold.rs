//! Rebuild sessions from the server databases and the frame log.

use crate::config::NetworkSettings;
use crate::context::Context;
use crate::lorawan::band::Band;
use crate::lorawan::Eui64;
use crate::session::{KeyEnvelope, RxWindow, SessionRecord};
use crate::sources::{DeviceProfile, Direction, FrameLog, IdentitySource, SourceError};

use super::{channel_state, Reconciler, SkipReason};

/// Ping slots per beacon period.
const PING_SLOT_SLOTS: u32 = 4096;

/// Transmissions per unconfirmed uplink assigned to restored sessions.
const RESTORED_NB_TRANS: u8 = 3;

/// Assembles a session from scratch for devices the store has lost.
///
/// Lookups run in a fixed order and the first missing piece decides the
/// skip reason:
///
/// 1. application-server device
/// 2. network-server device, then its profile
/// 3. last activation
/// 4. DevAddr agreement between 1 and 3
/// 5. last uplink and last downlink in the frame log
pub struct ColdRebuild<'a> {
    identity: &'a dyn IdentitySource,
    frames: &'a dyn FrameLog,
    band: &'a Band,
    settings: &'a NetworkSettings,
}

impl<'a> ColdRebuild<'a> {
    #[must_use]
    pub fn new(
        identity: &'a dyn IdentitySource,
        frames: &'a dyn FrameLog,
        band: &'a Band,
        settings: &'a NetworkSettings,
    ) -> Self {
        Self {
            identity,
            frames,
            band,
            settings,
        }
    }

    #[must_use]
    pub fn from_context(ctx: &'a Context) -> Self {
        Self::new(
            ctx.identity.as_ref(),
            ctx.frame_log.as_ref(),
            &ctx.band,
            &ctx.network_settings,
        )
    }

    fn rx_parameters(&self, profile: &DeviceProfile, record: &mut SessionRecord) {
        record.rx_window = RxWindow::Rx1;
        record.rx_delay = self.settings.rx1_delay;
        record.rx1_dr_offset = override_u8(profile.rx1_dr_offset, self.settings.rx1_dr_offset);
        record.rx2_dr = override_u8(profile.rx2_data_rate, self.settings.rx2_dr);
        record.rx2_frequency = if self.settings.rx2_frequency != 0 {
            self.settings.rx2_frequency
        } else {
            self.band.defaults().rx2_frequency
        };
    }
}

/// Profile value when set (not `-1` and in range), else `fallback`.
fn override_u8(value: i32, fallback: u8) -> u8 {
    u8::try_from(value).unwrap_or(fallback)
}

fn lookup<T>(dev_eui: &Eui64, what: &str, missing: SkipReason, result: Result<T, SourceError>) -> Result<T, SkipReason> {
    result.map_err(|e| match e {
        SourceError::NotFound => {
            log::info!("dev_eui={} skipped: no {}", dev_eui, what);
            missing
        }
        other => {
            log::error!("dev_eui={} skipped: {} lookup failed: {}", dev_eui, what, other);
            SkipReason::SourceError
        }
    })
}

impl Reconciler for ColdRebuild<'_> {
    fn mode(&self) -> &'static str {
        "restore"
    }

    fn reconcile(&self, dev_eui: &Eui64) -> Result<SessionRecord, SkipReason> {
        let app = lookup(
            dev_eui,
            "application-server device",
            SkipReason::UnknownApplicationDevice,
            self.identity.application_device(dev_eui),
        )?;
        let device = lookup(
            dev_eui,
            "network-server device",
            SkipReason::UnknownNetworkDevice,
            self.identity.network_device(dev_eui),
        )?;
        let profile = lookup(
            dev_eui,
            "device profile",
            SkipReason::UnknownDeviceProfile,
            self.identity.device_profile(&device.device_profile_id),
        )?;
        let activation = lookup(
            dev_eui,
            "activation",
            SkipReason::NoActivation,
            self.identity.last_activation(dev_eui),
        )?;

        if app.dev_addr != activation.dev_addr {
            log::warn!(
                "dev_eui={} skipped: application server has dev_addr {} but last join assigned {}",
                dev_eui,
                app.dev_addr,
                activation.dev_addr
            );
            return Err(SkipReason::AddressMismatch);
        }

        let rx = lookup(
            dev_eui,
            "logged uplink",
            SkipReason::NoTraffic,
            self.frames.last_frame(dev_eui, Direction::Rx),
        )?;
        let tx = lookup(
            dev_eui,
            "logged downlink",
            SkipReason::NoTraffic,
            self.frames.last_frame(dev_eui, Direction::Tx),
        )?;

        let mut record = SessionRecord {
            mac_version: profile.mac_version.clone(),
            device_profile_id: device.device_profile_id,
            service_profile_id: device.service_profile_id,
            routing_profile_id: device.routing_profile_id,
            dev_addr: activation.dev_addr,
            dev_eui: *dev_eui,
            join_eui: activation.join_eui,
            f_nwk_s_int_key: activation.f_nwk_s_int_key,
            s_nwk_s_int_key: activation.s_nwk_s_int_key,
            nwk_s_enc_key: activation.nwk_s_enc_key,
            app_s_key_envelope: Some(KeyEnvelope::clear(app.app_s_key)),
            skip_f_cnt_check: device.skip_fcnt_check,
            reference_altitude: device.reference_altitude,
            is_disabled: device.is_disabled,
            tx_power_index: 0,
            dr: 0,
            adr: true,
            nb_trans: RESTORED_NB_TRANS,
            ping_slot_dr: profile.ping_slot_dr,
            ping_slot_frequency: profile.ping_slot_freq,
            ..Default::default()
        };

        if profile.ping_slot_period != 0 {
            record.ping_slot_nb = PING_SLOT_SLOTS / profile.ping_slot_period;
        }

        self.rx_parameters(&profile, &mut record);

        record.f_cnt_up = rx.f_cnt_up.saturating_add(1);
        if record.is_lorawan_1_0() {
            record.n_f_cnt_down = tx.n_f_cnt_down.saturating_add(1);
        } else {
            record.a_f_cnt_down = tx.a_f_cnt_down.saturating_add(1);
        }
        record.conf_f_cnt = tx.conf_f_cnt;

        let (enabled, extra) = channel_state(self.band);
        record.enabled_uplink_channels = enabled;
        record.extra_uplink_channels = extra;

        log::debug!(
            "dev_eui={} rebuilt: dev_addr={} f_cnt_up={} downlink={}",
            dev_eui,
            record.dev_addr,
            record.f_cnt_up,
            record.downlink_counter()
        );
        Ok(record)
    }
}

//! In-memory device-session record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lorawan::band::Channel;
use crate::lorawan::{is_lorawan_1_0, AesKey, DevAddr, Eui64};

/// Number of uplinks kept in [`SessionRecord::uplink_history`].
pub const UPLINK_HISTORY_SIZE: usize = 20;

/// Receive window used for downlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RxWindow {
    /// First receive window
    #[default]
    Rx1 = 0,
    /// Second receive window
    Rx2 = 1,
}

impl RxWindow {
    /// Map a stored discriminant, anything but 1 being RX1.
    #[must_use]
    pub fn from_u32(value: u32) -> Self {
        if value == 1 {
            Self::Rx2
        } else {
            Self::Rx1
        }
    }
}

/// A key stored in wrapped form.
///
/// An empty `kek_label` means the key is held in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyEnvelope {
    /// Label of the key-encryption key.
    pub kek_label: String,
    /// Wrapped (or clear) key bytes.
    pub aes_key: Vec<u8>,
}

impl KeyEnvelope {
    /// Envelope holding `key` in the clear.
    #[must_use]
    pub fn clear(key: AesKey) -> Self {
        Self {
            kek_label: String::new(),
            aes_key: key.0.to_vec(),
        }
    }
}

/// Metadata of one received uplink, consumed by rate adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UplinkHistory {
    /// Frame counter of the uplink.
    pub f_cnt: u32,
    /// Best SNR over all receiving gateways.
    pub max_snr: f32,
    /// TX power index the device used.
    pub tx_power_index: u8,
    /// Number of gateways that received it.
    pub gateway_count: u32,
}

/// State needed to talk to one device between joins.
///
/// Records are replaced whole on save. `pending_rejoin` holds a complete
/// candidate record created by a rejoin that has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    /// LoRaWAN MAC version, e.g. `1.0.3`.
    pub mac_version: String,

    pub device_profile_id: Uuid,
    pub service_profile_id: Uuid,
    pub routing_profile_id: Uuid,

    pub dev_addr: DevAddr,
    pub dev_eui: Eui64,
    pub join_eui: Eui64,
    pub f_nwk_s_int_key: AesKey,
    pub s_nwk_s_int_key: AesKey,
    pub nwk_s_enc_key: AesKey,
    pub app_s_key_envelope: Option<KeyEnvelope>,

    pub f_cnt_up: u32,
    pub n_f_cnt_down: u32,
    pub a_f_cnt_down: u32,
    pub conf_f_cnt: u32,
    /// Accept any uplink frame counter (ABP devices that reset).
    pub skip_f_cnt_check: bool,

    pub rx_window: RxWindow,
    pub rx_delay: u8,
    pub rx1_dr_offset: u8,
    pub rx2_dr: u8,
    pub rx2_frequency: u32,

    pub tx_power_index: u8,
    pub dr: u8,
    pub adr: bool,
    pub min_supported_tx_power_index: u8,
    pub max_supported_tx_power_index: u8,
    pub nb_trans: u8,

    /// Channel indices active on the device, in activation order.
    pub enabled_uplink_channels: Vec<u32>,
    /// Channels beyond the region defaults, by channel index.
    pub extra_uplink_channels: BTreeMap<u32, Channel>,
    pub channel_frequencies: Vec<u32>,
    /// Last uplinks, oldest first.
    pub uplink_history: Vec<UplinkHistory>,

    pub last_device_status_request: Option<DateTime<Utc>>,
    pub last_downlink_tx: Option<DateTime<Utc>>,

    pub beacon_locked: bool,
    pub ping_slot_nb: u32,
    pub ping_slot_dr: u8,
    pub ping_slot_frequency: u32,

    pub rejoin_request_enabled: bool,
    pub rejoin_request_max_count_n: u32,
    pub rejoin_request_max_time_n: u32,
    pub rejoin_count_0: u16,
    pub pending_rejoin: Option<Box<SessionRecord>>,

    pub reference_altitude: f64,
    pub uplink_dwell_time_400ms: bool,
    pub downlink_dwell_time_400ms: bool,
    pub uplink_max_eirp_index: u8,
    pub mac_command_error_count: BTreeMap<u8, u32>,

    pub is_disabled: bool,
}

impl SessionRecord {
    /// Whether the record belongs to a LoRaWAN 1.0.x device.
    #[must_use]
    pub fn is_lorawan_1_0(&self) -> bool {
        is_lorawan_1_0(&self.mac_version)
    }

    /// The downlink counter in use: `NFCntDown` for 1.0.x, `AFCntDown` otherwise.
    #[must_use]
    pub fn downlink_counter(&self) -> u32 {
        if self.is_lorawan_1_0() {
            self.n_f_cnt_down
        } else {
            self.a_f_cnt_down
        }
    }

    /// Set the downlink counter selected by [`Self::downlink_counter`].
    pub fn set_downlink_counter(&mut self, value: u32) {
        if self.is_lorawan_1_0() {
            self.n_f_cnt_down = value;
        } else {
            self.a_f_cnt_down = value;
        }
    }

    /// Levels of pending records below this one.
    #[must_use]
    pub fn nesting_depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.pending_rejoin.as_deref();
        while let Some(p) = cur {
            depth += 1;
            cur = p.pending_rejoin.as_deref();
        }
        depth
    }

    /// Clear-text application session key, if the envelope holds one.
    #[must_use]
    pub fn clear_app_s_key(&self) -> Option<AesKey> {
        self.app_s_key_envelope
            .as_ref()
            .filter(|env| env.kek_label.is_empty())
            .and_then(|env| AesKey::from_slice(&env.aes_key).ok())
    }

    /// Append an uplink to the history, dropping the oldest past capacity.
    pub fn push_uplink_history(&mut self, entry: UplinkHistory) {
        self.uplink_history.push(entry);
        if self.uplink_history.len() > UPLINK_HISTORY_SIZE {
            let excess = self.uplink_history.len() - UPLINK_HISTORY_SIZE;
            self.uplink_history.drain(..excess);
        }
    }
}

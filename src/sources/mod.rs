//! Read-only sources consulted when rebuilding sessions.
//!
//! * [`IdentitySource`]: application-server and network-server device
//!   tables, device profiles and join history
//! * [`FrameLog`]: the per-device frame log
//!
//! [`sqlite`] implements both over SQLite databases.

pub mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::lorawan::{AesKey, DevAddr, Eui64};

pub use sqlite::{SqliteFrameLog, SqliteIdentityStore};

/// Source lookup failures.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No matching row.
    #[error("not found")]
    NotFound,

    /// The database failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row held a value that cannot be interpreted.
    #[error("invalid value in column '{column}': {reason}")]
    InvalidData {
        /// Column name
        column: &'static str,
        /// What was wrong
        reason: String,
    },
}

impl SourceError {
    /// Whether this is the expected "row absent" outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Device row of the application server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDevice {
    pub dev_eui: Eui64,
    /// Address the application server believes is current.
    pub dev_addr: DevAddr,
    pub app_s_key: AesKey,
    pub is_disabled: bool,
}

/// Device row of the network server.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkDevice {
    pub dev_eui: Eui64,
    pub device_profile_id: Uuid,
    pub service_profile_id: Uuid,
    pub routing_profile_id: Uuid,
    pub skip_fcnt_check: bool,
    pub reference_altitude: f64,
    pub is_disabled: bool,
}

/// Channel-plan relevant part of a network-server device profile.
///
/// RX overrides of `-1` mean "use the network default".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub id: Uuid,
    pub mac_version: String,
    pub ping_slot_period: u32,
    pub ping_slot_dr: u8,
    pub ping_slot_freq: u32,
    pub rx1_delay: i32,
    pub rx1_dr_offset: i32,
    pub rx2_data_rate: i32,
    pub rx2_freq: i32,
}

/// One join of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceActivation {
    pub created_at: DateTime<Utc>,
    pub dev_eui: Eui64,
    pub join_eui: Eui64,
    pub dev_addr: DevAddr,
    pub f_nwk_s_int_key: AesKey,
    pub s_nwk_s_int_key: AesKey,
    pub nwk_s_enc_key: AesKey,
}

/// Direction of a logged frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from the device
    Rx,
    /// Sent to the device
    Tx,
}

impl Direction {
    /// Column value used by the frame log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rx => "RX",
            Self::Tx => "TX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters recorded with a logged frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLogEntry {
    pub dev_eui: Eui64,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub f_cnt_up: u32,
    pub n_f_cnt_down: u32,
    pub a_f_cnt_down: u32,
    pub conf_f_cnt: u32,
}

/// Relational device and join data.
pub trait IdentitySource {
    /// Application-server device row.
    fn application_device(&self, dev_eui: &Eui64) -> Result<AppDevice, SourceError>;

    /// Network-server device row.
    fn network_device(&self, dev_eui: &Eui64) -> Result<NetworkDevice, SourceError>;

    /// Network-server device profile.
    fn device_profile(&self, id: &Uuid) -> Result<DeviceProfile, SourceError>;

    /// Most recent join of the device.
    fn last_activation(&self, dev_eui: &Eui64) -> Result<DeviceActivation, SourceError>;
}

/// Append-only frame history.
pub trait FrameLog {
    /// Most recent frame of the device in `direction`.
    fn last_frame(&self, dev_eui: &Eui64, direction: Direction) -> Result<FrameLogEntry, SourceError>;
}

//! SQLite implementations of the identity and frame-log sources.
//!
//! Identifiers are stored as raw bytes in the server databases and as hex
//! text in the frame log. Timestamps are unix milliseconds.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use uuid::Uuid;

use super::{
    AppDevice, DeviceActivation, DeviceProfile, Direction, FrameLog, FrameLogEntry,
    IdentitySource, NetworkDevice, SourceError,
};
use crate::lorawan::{AesKey, DevAddr, Eui64, IdParseError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const APPLICATION_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS device (
    dev_eui BLOB PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    dev_addr BLOB NOT NULL,
    app_s_key BLOB NOT NULL,
    is_disabled INTEGER NOT NULL DEFAULT 0
);
";

const NETWORK_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS device (
    dev_eui BLOB PRIMARY KEY,
    device_profile_id TEXT NOT NULL,
    service_profile_id TEXT NOT NULL,
    routing_profile_id TEXT NOT NULL,
    skip_fcnt_check INTEGER NOT NULL DEFAULT 0,
    reference_altitude REAL NOT NULL DEFAULT 0,
    is_disabled INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS device_profile (
    device_profile_id TEXT PRIMARY KEY,
    mac_version TEXT NOT NULL,
    ping_slot_period INTEGER NOT NULL DEFAULT 0,
    ping_slot_dr INTEGER NOT NULL DEFAULT 0,
    ping_slot_freq INTEGER NOT NULL DEFAULT 0,
    rx1_delay INTEGER NOT NULL DEFAULT -1,
    rx1_dr_offset INTEGER NOT NULL DEFAULT -1,
    rx2_data_rate INTEGER NOT NULL DEFAULT -1,
    rx2_freq INTEGER NOT NULL DEFAULT -1
);
CREATE TABLE IF NOT EXISTS device_activation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL,
    dev_eui BLOB NOT NULL,
    join_eui BLOB NOT NULL,
    dev_addr BLOB NOT NULL,
    f_nwk_s_int_key BLOB NOT NULL,
    s_nwk_s_int_key BLOB NOT NULL,
    nwk_s_enc_key BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_device_activation_dev_eui
    ON device_activation (dev_eui, created_at);
";

const FRAME_LOG_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS device_frames (
    dev_eui TEXT NOT NULL,
    direction TEXT NOT NULL,
    date_time INTEGER NOT NULL,
    f_cnt_up INTEGER NOT NULL DEFAULT 0,
    n_f_cnt_down INTEGER NOT NULL DEFAULT 0,
    a_f_cnt_down INTEGER NOT NULL DEFAULT 0,
    conf_f_cnt INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_device_frames_lookup
    ON device_frames (dev_eui, direction, date_time);
";

fn open(path: &Path) -> Result<Connection, SourceError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn fixed<T>(
    column: &'static str,
    bytes: &[u8],
    parse: fn(&[u8]) -> Result<T, IdParseError>,
) -> Result<T, SourceError> {
    parse(bytes).map_err(|e| SourceError::InvalidData {
        column,
        reason: e.to_string(),
    })
}

fn uuid_col(column: &'static str, s: &str) -> Result<Uuid, SourceError> {
    Uuid::parse_str(s).map_err(|e| SourceError::InvalidData {
        column,
        reason: e.to_string(),
    })
}

fn millis_col(column: &'static str, ms: i64) -> Result<DateTime<Utc>, SourceError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| SourceError::InvalidData {
            column,
            reason: format!("timestamp {ms} out of range"),
        })
}

fn u32_col(column: &'static str, v: i64) -> Result<u32, SourceError> {
    u32::try_from(v).map_err(|_| SourceError::InvalidData {
        column,
        reason: format!("{v} does not fit an unsigned 32-bit counter"),
    })
}

/// Application-server and network-server databases.
pub struct SqliteIdentityStore {
    application: Connection,
    network: Connection,
}

impl SqliteIdentityStore {
    /// Open both databases.
    pub fn open(application_db: &Path, network_db: &Path) -> Result<Self, SourceError> {
        Ok(Self {
            application: open(application_db)?,
            network: open(network_db)?,
        })
    }

    /// Two empty in-memory databases with the schema in place.
    pub fn open_in_memory() -> Result<Self, SourceError> {
        let store = Self {
            application: Connection::open_in_memory()?,
            network: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create missing tables.
    pub fn init_schema(&self) -> Result<(), SourceError> {
        self.application.execute_batch(APPLICATION_SCHEMA)?;
        self.network.execute_batch(NETWORK_SCHEMA)?;
        Ok(())
    }

    pub fn insert_application_device(&self, d: &AppDevice) -> Result<(), SourceError> {
        self.application.execute(
            "INSERT OR REPLACE INTO device (dev_eui, dev_addr, app_s_key, is_disabled)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                d.dev_eui.as_bytes().as_slice(),
                d.dev_addr.as_bytes().as_slice(),
                d.app_s_key.as_bytes().as_slice(),
                d.is_disabled
            ],
        )?;
        Ok(())
    }

    pub fn insert_network_device(&self, d: &NetworkDevice) -> Result<(), SourceError> {
        self.network.execute(
            "INSERT OR REPLACE INTO device (dev_eui, device_profile_id, service_profile_id,
                routing_profile_id, skip_fcnt_check, reference_altitude, is_disabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                d.dev_eui.as_bytes().as_slice(),
                d.device_profile_id.to_string(),
                d.service_profile_id.to_string(),
                d.routing_profile_id.to_string(),
                d.skip_fcnt_check,
                d.reference_altitude,
                d.is_disabled
            ],
        )?;
        Ok(())
    }

    pub fn insert_device_profile(&self, p: &DeviceProfile) -> Result<(), SourceError> {
        self.network.execute(
            "INSERT OR REPLACE INTO device_profile (device_profile_id, mac_version,
                ping_slot_period, ping_slot_dr, ping_slot_freq,
                rx1_delay, rx1_dr_offset, rx2_data_rate, rx2_freq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                p.id.to_string(),
                p.mac_version,
                p.ping_slot_period,
                p.ping_slot_dr,
                p.ping_slot_freq,
                p.rx1_delay,
                p.rx1_dr_offset,
                p.rx2_data_rate,
                p.rx2_freq
            ],
        )?;
        Ok(())
    }

    pub fn insert_activation(&self, a: &DeviceActivation) -> Result<(), SourceError> {
        self.network.execute(
            "INSERT INTO device_activation (created_at, dev_eui, join_eui, dev_addr,
                f_nwk_s_int_key, s_nwk_s_int_key, nwk_s_enc_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                a.created_at.timestamp_millis(),
                a.dev_eui.as_bytes().as_slice(),
                a.join_eui.as_bytes().as_slice(),
                a.dev_addr.as_bytes().as_slice(),
                a.f_nwk_s_int_key.as_bytes().as_slice(),
                a.s_nwk_s_int_key.as_bytes().as_slice(),
                a.nwk_s_enc_key.as_bytes().as_slice()
            ],
        )?;
        Ok(())
    }
}

impl IdentitySource for SqliteIdentityStore {
    fn application_device(&self, dev_eui: &Eui64) -> Result<AppDevice, SourceError> {
        let row = self
            .application
            .query_row(
                "SELECT dev_addr, app_s_key, is_disabled FROM device WHERE dev_eui = ?1",
                params![dev_eui.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(SourceError::NotFound)?;

        Ok(AppDevice {
            dev_eui: *dev_eui,
            dev_addr: fixed("dev_addr", &row.0, DevAddr::from_slice)?,
            app_s_key: fixed("app_s_key", &row.1, AesKey::from_slice)?,
            is_disabled: row.2,
        })
    }

    fn network_device(&self, dev_eui: &Eui64) -> Result<NetworkDevice, SourceError> {
        let row = self
            .network
            .query_row(
                "SELECT device_profile_id, service_profile_id, routing_profile_id,
                        skip_fcnt_check, reference_altitude, is_disabled
                 FROM device WHERE dev_eui = ?1",
                params![dev_eui.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?
            .ok_or(SourceError::NotFound)?;

        Ok(NetworkDevice {
            dev_eui: *dev_eui,
            device_profile_id: uuid_col("device_profile_id", &row.0)?,
            service_profile_id: uuid_col("service_profile_id", &row.1)?,
            routing_profile_id: uuid_col("routing_profile_id", &row.2)?,
            skip_fcnt_check: row.3,
            reference_altitude: row.4,
            is_disabled: row.5,
        })
    }

    fn device_profile(&self, id: &Uuid) -> Result<DeviceProfile, SourceError> {
        let row = self
            .network
            .query_row(
                "SELECT mac_version, ping_slot_period, ping_slot_dr, ping_slot_freq,
                        rx1_delay, rx1_dr_offset, rx2_data_rate, rx2_freq
                 FROM device_profile WHERE device_profile_id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i32>(4)?,
                        row.get::<_, i32>(5)?,
                        row.get::<_, i32>(6)?,
                        row.get::<_, i32>(7)?,
                    ))
                },
            )
            .optional()?
            .ok_or(SourceError::NotFound)?;

        Ok(DeviceProfile {
            id: *id,
            mac_version: row.0,
            ping_slot_period: u32_col("ping_slot_period", row.1)?,
            ping_slot_dr: u8::try_from(row.2).map_err(|_| SourceError::InvalidData {
                column: "ping_slot_dr",
                reason: format!("{} is not a data rate", row.2),
            })?,
            ping_slot_freq: u32_col("ping_slot_freq", row.3)?,
            rx1_delay: row.4,
            rx1_dr_offset: row.5,
            rx2_data_rate: row.6,
            rx2_freq: row.7,
        })
    }

    fn last_activation(&self, dev_eui: &Eui64) -> Result<DeviceActivation, SourceError> {
        let row = self
            .network
            .query_row(
                "SELECT created_at, join_eui, dev_addr, f_nwk_s_int_key, s_nwk_s_int_key, nwk_s_enc_key
                 FROM device_activation WHERE dev_eui = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![dev_eui.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                    ))
                },
            )
            .optional()?
            .ok_or(SourceError::NotFound)?;

        Ok(DeviceActivation {
            created_at: millis_col("created_at", row.0)?,
            dev_eui: *dev_eui,
            join_eui: fixed("join_eui", &row.1, Eui64::from_slice)?,
            dev_addr: fixed("dev_addr", &row.2, DevAddr::from_slice)?,
            f_nwk_s_int_key: fixed("f_nwk_s_int_key", &row.3, AesKey::from_slice)?,
            s_nwk_s_int_key: fixed("s_nwk_s_int_key", &row.4, AesKey::from_slice)?,
            nwk_s_enc_key: fixed("nwk_s_enc_key", &row.5, AesKey::from_slice)?,
        })
    }
}

/// Frame-log database.
pub struct SqliteFrameLog {
    conn: Connection,
}

impl SqliteFrameLog {
    /// Open the frame-log database.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Ok(Self { conn: open(path)? })
    }

    /// Empty in-memory frame log with the schema in place.
    pub fn open_in_memory() -> Result<Self, SourceError> {
        let log = Self {
            conn: Connection::open_in_memory()?,
        };
        log.init_schema()?;
        Ok(log)
    }

    /// Create missing tables.
    pub fn init_schema(&self) -> Result<(), SourceError> {
        self.conn.execute_batch(FRAME_LOG_SCHEMA)?;
        Ok(())
    }

    pub fn insert_frame(&self, f: &FrameLogEntry) -> Result<(), SourceError> {
        self.conn.execute(
            "INSERT INTO device_frames (dev_eui, direction, date_time,
                f_cnt_up, n_f_cnt_down, a_f_cnt_down, conf_f_cnt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                f.dev_eui.to_string(),
                f.direction.as_str(),
                f.timestamp.timestamp_millis(),
                f.f_cnt_up,
                f.n_f_cnt_down,
                f.a_f_cnt_down,
                f.conf_f_cnt
            ],
        )?;
        Ok(())
    }
}

impl FrameLog for SqliteFrameLog {
    fn last_frame(&self, dev_eui: &Eui64, direction: Direction) -> Result<FrameLogEntry, SourceError> {
        let row = self
            .conn
            .query_row(
                "SELECT date_time, f_cnt_up, n_f_cnt_down, a_f_cnt_down, conf_f_cnt
                 FROM device_frames WHERE dev_eui = ?1 AND direction = ?2
                 ORDER BY date_time DESC, rowid DESC LIMIT 1",
                params![dev_eui.to_string(), direction.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?
            .ok_or(SourceError::NotFound)?;

        Ok(FrameLogEntry {
            dev_eui: *dev_eui,
            direction,
            timestamp: millis_col("date_time", row.0)?,
            f_cnt_up: u32_col("f_cnt_up", row.1)?,
            n_f_cnt_down: u32_col("n_f_cnt_down", row.2)?,
            a_f_cnt_down: u32_col("a_f_cnt_down", row.3)?,
            conf_f_cnt: u32_col("conf_f_cnt", row.4)?,
        })
    }
}

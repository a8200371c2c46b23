//! Shared seeding helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use session_wrench::lorawan::{AesKey, DevAddr, Eui64};
use session_wrench::session::SessionRecord;
use session_wrench::sources::{
    AppDevice, DeviceActivation, DeviceProfile, Direction, FrameLogEntry, NetworkDevice,
    SqliteFrameLog, SqliteIdentityStore,
};
use session_wrench::store::{KeyLayout, MemoryKv, SessionStore};
use uuid::Uuid;

pub const PROFILE_ID: Uuid = Uuid::from_u128(0xd0_0001);
pub const SERVICE_PROFILE_ID: Uuid = Uuid::from_u128(0x50_0001);
pub const ROUTING_PROFILE_ID: Uuid = Uuid::from_u128(0x70_0001);
pub const APP_S_KEY: AesKey = AesKey([0x0a; 16]);

pub fn eui(last: u8) -> Eui64 {
    Eui64([0xaa, 0, 0, 0, 0, 0, 0, last])
}

pub fn addr(last: u8) -> DevAddr {
    DevAddr([0x26, 0x01, 0x00, last])
}

pub fn layout() -> KeyLayout {
    KeyLayout {
        device_namespace: "lora:ns:device".into(),
        devaddr_namespace: "lora:ns:devaddr".into(),
        plan_id: "ru864".into(),
    }
}

/// Store over `kv`; the caller keeps `kv` to inspect raw keys.
pub fn store(kv: &MemoryKv) -> SessionStore {
    SessionStore::new(Box::new(kv.clone()), layout(), Duration::from_secs(3600))
}

pub fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

/// Network-server side of the world: devices, profiles, joins and frames.
pub struct World {
    pub ids: SqliteIdentityStore,
    pub frames: SqliteFrameLog,
}

impl World {
    pub fn new(mac_version: &str) -> Self {
        let ids = SqliteIdentityStore::open_in_memory().unwrap();
        ids.insert_device_profile(&DeviceProfile {
            id: PROFILE_ID,
            mac_version: mac_version.into(),
            ping_slot_period: 128,
            ping_slot_dr: 0,
            ping_slot_freq: 0,
            rx1_delay: -1,
            rx1_dr_offset: -1,
            rx2_data_rate: -1,
            rx2_freq: -1,
        })
        .unwrap();
        Self {
            ids,
            frames: SqliteFrameLog::open_in_memory().unwrap(),
        }
    }

    /// Register a device on both servers and record one join at `joined`.
    pub fn register(&self, dev_eui: Eui64, dev_addr: DevAddr, joined: DateTime<Utc>) {
        self.ids
            .insert_application_device(&AppDevice {
                dev_eui,
                dev_addr,
                app_s_key: APP_S_KEY,
                is_disabled: false,
            })
            .unwrap();
        self.register_network_only(dev_eui);
        self.ids
            .insert_activation(&DeviceActivation {
                created_at: joined,
                dev_eui,
                join_eui: Eui64([0x70, 0xb3, 0xd5, 0x7e, 0xd0, 0, 0, 0]),
                dev_addr,
                f_nwk_s_int_key: AesKey([1; 16]),
                s_nwk_s_int_key: AesKey([2; 16]),
                nwk_s_enc_key: AesKey([3; 16]),
            })
            .unwrap();
    }

    pub fn register_network_only(&self, dev_eui: Eui64) {
        self.ids
            .insert_network_device(&NetworkDevice {
                dev_eui,
                device_profile_id: PROFILE_ID,
                service_profile_id: SERVICE_PROFILE_ID,
                routing_profile_id: ROUTING_PROFILE_ID,
                skip_fcnt_check: false,
                reference_altitude: 0.0,
                is_disabled: false,
            })
            .unwrap();
    }

    pub fn uplink(&self, dev_eui: Eui64, f_cnt_up: u32) {
        self.frame(dev_eui, Direction::Rx, f_cnt_up, 0, 0);
    }

    pub fn downlink(&self, dev_eui: Eui64, n_f_cnt_down: u32, a_f_cnt_down: u32) {
        self.frame(dev_eui, Direction::Tx, 0, n_f_cnt_down, a_f_cnt_down);
    }

    fn frame(&self, dev_eui: Eui64, direction: Direction, up: u32, n_down: u32, a_down: u32) {
        self.frames
            .insert_frame(&FrameLogEntry {
                dev_eui,
                direction,
                timestamp: at(2024, 2, 20, 8),
                f_cnt_up: up,
                n_f_cnt_down: n_down,
                a_f_cnt_down: a_down,
                conf_f_cnt: 0,
            })
            .unwrap();
    }
}

/// A plausible stored session, as a dump would hold it.
pub fn session(dev_eui: Eui64, dev_addr: DevAddr, f_cnt_up: u32, n_f_cnt_down: u32) -> SessionRecord {
    SessionRecord {
        mac_version: "1.0.3".into(),
        device_profile_id: PROFILE_ID,
        service_profile_id: SERVICE_PROFILE_ID,
        routing_profile_id: ROUTING_PROFILE_ID,
        dev_addr,
        dev_eui,
        f_nwk_s_int_key: AesKey([1; 16]),
        s_nwk_s_int_key: AesKey([1; 16]),
        nwk_s_enc_key: AesKey([1; 16]),
        app_s_key_envelope: Some(session_wrench::session::KeyEnvelope::clear(APP_S_KEY)),
        f_cnt_up,
        n_f_cnt_down,
        rx_delay: 1,
        rx2_frequency: 869_100_000,
        nb_trans: 1,
        enabled_uplink_channels: vec![0, 1],
        ..Default::default()
    }
}

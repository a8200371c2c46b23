//! Binary encoding of [`SessionRecord`].
//!
//! Records are stored as protobuf messages. Decoders skip unknown fields and
//! absent fields take their zero value, so records written by newer or older
//! versions of the network server still load. The pending-rejoin record is
//! encoded separately and embedded as an opaque `bytes` field.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use prost::Message;
use thiserror::Error;
use uuid::Uuid;

use super::record::{KeyEnvelope, RxWindow, SessionRecord, UplinkHistory};
use crate::lorawan::band::Channel;
use crate::lorawan::{AesKey, DevAddr, Eui64};

/// Deepest chain of pending records accepted by the codec.
pub const MAX_NESTING_DEPTH: usize = 4;

/// `UnixNano` of Go's zero `time.Time`, written by older servers for an unset time.
pub const GO_ZERO_TIME_UNIX_NS: i64 = -6_795_364_578_871_345_152;

/// Codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bytes are not a valid record message.
    #[error("malformed device-session: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Pending records nest deeper than [`MAX_NESTING_DEPTH`].
    #[error("pending-rejoin nesting depth {depth} exceeds maximum {max}")]
    NestingTooDeep {
        /// Depth of the record being encoded
        depth: usize,
        /// Allowed depth
        max: usize,
    },

    /// Timestamp outside the nanosecond range of an `i64`.
    #[error("timestamp {0} cannot be stored in nanoseconds")]
    TimestampOutOfRange(DateTime<Utc>),
}

/// Wire message of a key envelope.
#[derive(Clone, PartialEq, Message)]
pub struct KeyEnvelopePb {
    #[prost(string, tag = "1")]
    pub kek_label: String,
    #[prost(bytes = "vec", tag = "2")]
    pub aes_key: Vec<u8>,
}

/// Wire message of an extra uplink channel.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelPb {
    #[prost(uint32, tag = "1")]
    pub frequency: u32,
    #[prost(uint32, tag = "2")]
    pub min_dr: u32,
    #[prost(uint32, tag = "3")]
    pub max_dr: u32,
}

/// Wire message of one uplink history entry.
#[derive(Clone, PartialEq, Message)]
pub struct UplinkHistoryPb {
    #[prost(uint32, tag = "1")]
    pub f_cnt: u32,
    #[prost(float, tag = "2")]
    pub max_snr: f32,
    #[prost(uint32, tag = "3")]
    pub tx_power_index: u32,
    #[prost(uint32, tag = "4")]
    pub gateway_count: u32,
}

/// Wire message of a device-session.
#[derive(Clone, PartialEq, Message)]
pub struct SessionRecordPb {
    #[prost(string, tag = "1")]
    pub device_profile_id: String,
    #[prost(string, tag = "2")]
    pub service_profile_id: String,
    #[prost(string, tag = "3")]
    pub routing_profile_id: String,
    #[prost(bytes = "vec", tag = "4")]
    pub dev_addr: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub dev_eui: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub join_eui: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub f_nwk_s_int_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub s_nwk_s_int_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "9")]
    pub nwk_s_enc_key: Vec<u8>,
    #[prost(uint32, tag = "10")]
    pub f_cnt_up: u32,
    #[prost(uint32, tag = "11")]
    pub n_f_cnt_down: u32,
    #[prost(uint32, tag = "12")]
    pub a_f_cnt_down: u32,
    #[prost(bool, tag = "13")]
    pub skip_f_cnt_check: bool,
    #[prost(uint32, tag = "14")]
    pub rx_delay: u32,
    #[prost(uint32, tag = "15")]
    pub rx1_dr_offset: u32,
    #[prost(uint32, tag = "16")]
    pub rx2_dr: u32,
    #[prost(uint32, tag = "17")]
    pub rx2_frequency: u32,
    #[prost(uint32, tag = "18")]
    pub tx_power_index: u32,
    #[prost(uint32, tag = "19")]
    pub dr: u32,
    #[prost(bool, tag = "20")]
    pub adr: bool,
    #[prost(uint32, tag = "21")]
    pub max_supported_tx_power_index: u32,
    #[prost(uint32, tag = "23")]
    pub nb_trans: u32,
    #[prost(uint32, repeated, tag = "24")]
    pub enabled_uplink_channels: Vec<u32>,
    #[prost(btree_map = "uint32, message", tag = "25")]
    pub extra_uplink_channels: BTreeMap<u32, ChannelPb>,
    #[prost(uint32, repeated, tag = "26")]
    pub channel_frequencies: Vec<u32>,
    #[prost(message, repeated, tag = "27")]
    pub uplink_adr_history: Vec<UplinkHistoryPb>,
    #[prost(int64, optional, tag = "29")]
    pub last_device_status_request_time_unix_ns: Option<i64>,
    #[prost(int64, optional, tag = "32")]
    pub last_downlink_tx_timestamp_unix_ns: Option<i64>,
    #[prost(bool, tag = "33")]
    pub beacon_locked: bool,
    #[prost(uint32, tag = "34")]
    pub ping_slot_nb: u32,
    #[prost(uint32, tag = "35")]
    pub ping_slot_dr: u32,
    #[prost(uint32, tag = "36")]
    pub ping_slot_frequency: u32,
    #[prost(string, tag = "37")]
    pub mac_version: String,
    #[prost(uint32, tag = "38")]
    pub min_supported_tx_power_index: u32,
    #[prost(uint32, tag = "39")]
    pub conf_f_cnt: u32,
    #[prost(uint32, tag = "40")]
    pub rejoin_request_max_count_n: u32,
    #[prost(uint32, tag = "41")]
    pub rejoin_request_max_time_n: u32,
    #[prost(uint32, tag = "42")]
    pub rejoin_count_0: u32,
    #[prost(bytes = "vec", tag = "43")]
    pub pending_rejoin_device_session: Vec<u8>,
    #[prost(bool, tag = "44")]
    pub rejoin_request_enabled: bool,
    #[prost(message, optional, tag = "45")]
    pub app_s_key_envelope: Option<KeyEnvelopePb>,
    #[prost(double, tag = "46")]
    pub reference_altitude: f64,
    #[prost(bool, tag = "47")]
    pub uplink_dwell_time_400ms: bool,
    #[prost(bool, tag = "48")]
    pub downlink_dwell_time_400ms: bool,
    #[prost(uint32, tag = "49")]
    pub uplink_max_eirp_index: u32,
    #[prost(btree_map = "uint32, uint32", tag = "50")]
    pub mac_command_error_count: BTreeMap<u32, u32>,
    #[prost(bool, tag = "51")]
    pub is_disabled: bool,
    #[prost(uint32, tag = "52")]
    pub rx_window: u32,
}

/// Encode a record.
///
/// Fails when pending records nest deeper than [`MAX_NESTING_DEPTH`] or a
/// timestamp does not fit in `i64` nanoseconds.
pub fn encode(record: &SessionRecord) -> Result<Vec<u8>, CodecError> {
    let depth = record.nesting_depth();
    if depth > MAX_NESTING_DEPTH {
        return Err(CodecError::NestingTooDeep {
            depth,
            max: MAX_NESTING_DEPTH,
        });
    }
    Ok(to_pb(record)?.encode_to_vec())
}

/// Decode a record.
///
/// A pending record that fails to decode, or that sits deeper than
/// [`MAX_NESTING_DEPTH`], is logged and dropped; the outer record still loads.
pub fn decode(bytes: &[u8]) -> Result<SessionRecord, CodecError> {
    let pb = SessionRecordPb::decode(bytes)?;
    Ok(from_pb(pb, 0))
}

fn to_pb(r: &SessionRecord) -> Result<SessionRecordPb, CodecError> {
    let pending_rejoin_device_session = match r.pending_rejoin.as_deref() {
        Some(p) => to_pb(p)?.encode_to_vec(),
        None => Vec::new(),
    };
    Ok(SessionRecordPb {
        device_profile_id: r.device_profile_id.to_string(),
        service_profile_id: r.service_profile_id.to_string(),
        routing_profile_id: r.routing_profile_id.to_string(),
        dev_addr: r.dev_addr.0.to_vec(),
        dev_eui: r.dev_eui.0.to_vec(),
        join_eui: r.join_eui.0.to_vec(),
        f_nwk_s_int_key: r.f_nwk_s_int_key.0.to_vec(),
        s_nwk_s_int_key: r.s_nwk_s_int_key.0.to_vec(),
        nwk_s_enc_key: r.nwk_s_enc_key.0.to_vec(),
        f_cnt_up: r.f_cnt_up,
        n_f_cnt_down: r.n_f_cnt_down,
        a_f_cnt_down: r.a_f_cnt_down,
        skip_f_cnt_check: r.skip_f_cnt_check,
        rx_delay: r.rx_delay.into(),
        rx1_dr_offset: r.rx1_dr_offset.into(),
        rx2_dr: r.rx2_dr.into(),
        rx2_frequency: r.rx2_frequency,
        tx_power_index: r.tx_power_index.into(),
        dr: r.dr.into(),
        adr: r.adr,
        max_supported_tx_power_index: r.max_supported_tx_power_index.into(),
        nb_trans: r.nb_trans.into(),
        enabled_uplink_channels: r.enabled_uplink_channels.clone(),
        extra_uplink_channels: r
            .extra_uplink_channels
            .iter()
            .map(|(i, c)| {
                (
                    *i,
                    ChannelPb {
                        frequency: c.frequency,
                        min_dr: c.min_dr.into(),
                        max_dr: c.max_dr.into(),
                    },
                )
            })
            .collect(),
        channel_frequencies: r.channel_frequencies.clone(),
        uplink_adr_history: r
            .uplink_history
            .iter()
            .map(|h| UplinkHistoryPb {
                f_cnt: h.f_cnt,
                max_snr: h.max_snr,
                tx_power_index: h.tx_power_index.into(),
                gateway_count: h.gateway_count,
            })
            .collect(),
        last_device_status_request_time_unix_ns: to_unix_ns(r.last_device_status_request)?,
        last_downlink_tx_timestamp_unix_ns: to_unix_ns(r.last_downlink_tx)?,
        beacon_locked: r.beacon_locked,
        ping_slot_nb: r.ping_slot_nb,
        ping_slot_dr: r.ping_slot_dr.into(),
        ping_slot_frequency: r.ping_slot_frequency,
        mac_version: r.mac_version.clone(),
        min_supported_tx_power_index: r.min_supported_tx_power_index.into(),
        conf_f_cnt: r.conf_f_cnt,
        rejoin_request_max_count_n: r.rejoin_request_max_count_n,
        rejoin_request_max_time_n: r.rejoin_request_max_time_n,
        rejoin_count_0: r.rejoin_count_0.into(),
        pending_rejoin_device_session,
        rejoin_request_enabled: r.rejoin_request_enabled,
        app_s_key_envelope: r.app_s_key_envelope.as_ref().map(|env| KeyEnvelopePb {
            kek_label: env.kek_label.clone(),
            aes_key: env.aes_key.clone(),
        }),
        reference_altitude: r.reference_altitude,
        uplink_dwell_time_400ms: r.uplink_dwell_time_400ms,
        downlink_dwell_time_400ms: r.downlink_dwell_time_400ms,
        uplink_max_eirp_index: r.uplink_max_eirp_index.into(),
        mac_command_error_count: r
            .mac_command_error_count
            .iter()
            .map(|(cid, n)| (u32::from(*cid), *n))
            .collect(),
        is_disabled: r.is_disabled,
        rx_window: r.rx_window as u32,
    })
}

fn from_pb(pb: SessionRecordPb, depth: usize) -> SessionRecord {
    let dev_eui = Eui64::from_slice_lossy(&pb.dev_eui);
    let pending_rejoin = decode_pending(&pb.pending_rejoin_device_session, dev_eui, depth);

    SessionRecord {
        mac_version: pb.mac_version,
        device_profile_id: parse_uuid(&pb.device_profile_id),
        service_profile_id: parse_uuid(&pb.service_profile_id),
        routing_profile_id: parse_uuid(&pb.routing_profile_id),
        dev_addr: DevAddr::from_slice_lossy(&pb.dev_addr),
        dev_eui,
        join_eui: Eui64::from_slice_lossy(&pb.join_eui),
        f_nwk_s_int_key: AesKey::from_slice_lossy(&pb.f_nwk_s_int_key),
        s_nwk_s_int_key: AesKey::from_slice_lossy(&pb.s_nwk_s_int_key),
        nwk_s_enc_key: AesKey::from_slice_lossy(&pb.nwk_s_enc_key),
        app_s_key_envelope: pb.app_s_key_envelope.map(|env| KeyEnvelope {
            kek_label: env.kek_label,
            aes_key: env.aes_key,
        }),
        f_cnt_up: pb.f_cnt_up,
        n_f_cnt_down: pb.n_f_cnt_down,
        a_f_cnt_down: pb.a_f_cnt_down,
        conf_f_cnt: pb.conf_f_cnt,
        skip_f_cnt_check: pb.skip_f_cnt_check,
        rx_window: RxWindow::from_u32(pb.rx_window),
        rx_delay: sat_u8(pb.rx_delay),
        rx1_dr_offset: sat_u8(pb.rx1_dr_offset),
        rx2_dr: sat_u8(pb.rx2_dr),
        rx2_frequency: pb.rx2_frequency,
        tx_power_index: sat_u8(pb.tx_power_index),
        dr: sat_u8(pb.dr),
        adr: pb.adr,
        min_supported_tx_power_index: sat_u8(pb.min_supported_tx_power_index),
        max_supported_tx_power_index: sat_u8(pb.max_supported_tx_power_index),
        nb_trans: sat_u8(pb.nb_trans),
        enabled_uplink_channels: pb.enabled_uplink_channels,
        extra_uplink_channels: pb
            .extra_uplink_channels
            .into_iter()
            .map(|(i, c)| {
                (
                    i,
                    Channel {
                        frequency: c.frequency,
                        min_dr: sat_u8(c.min_dr),
                        max_dr: sat_u8(c.max_dr),
                    },
                )
            })
            .collect(),
        channel_frequencies: pb.channel_frequencies,
        uplink_history: pb
            .uplink_adr_history
            .into_iter()
            .map(|h| UplinkHistory {
                f_cnt: h.f_cnt,
                max_snr: h.max_snr,
                tx_power_index: sat_u8(h.tx_power_index),
                gateway_count: h.gateway_count,
            })
            .collect(),
        last_device_status_request: from_unix_ns(pb.last_device_status_request_time_unix_ns),
        last_downlink_tx: from_unix_ns(pb.last_downlink_tx_timestamp_unix_ns),
        beacon_locked: pb.beacon_locked,
        ping_slot_nb: pb.ping_slot_nb,
        ping_slot_dr: sat_u8(pb.ping_slot_dr),
        ping_slot_frequency: pb.ping_slot_frequency,
        rejoin_request_enabled: pb.rejoin_request_enabled,
        rejoin_request_max_count_n: pb.rejoin_request_max_count_n,
        rejoin_request_max_time_n: pb.rejoin_request_max_time_n,
        rejoin_count_0: u16::try_from(pb.rejoin_count_0).unwrap_or(u16::MAX),
        pending_rejoin,
        reference_altitude: pb.reference_altitude,
        uplink_dwell_time_400ms: pb.uplink_dwell_time_400ms,
        downlink_dwell_time_400ms: pb.downlink_dwell_time_400ms,
        uplink_max_eirp_index: sat_u8(pb.uplink_max_eirp_index),
        mac_command_error_count: pb
            .mac_command_error_count
            .into_iter()
            .map(|(cid, n)| (sat_u8(cid), n))
            .collect(),
        is_disabled: pb.is_disabled,
    }
}

fn decode_pending(bytes: &[u8], dev_eui: Eui64, depth: usize) -> Option<Box<SessionRecord>> {
    if bytes.is_empty() {
        return None;
    }
    if depth >= MAX_NESTING_DEPTH {
        log::warn!(
            "dev_eui={} pending-rejoin nested deeper than {}, dropped",
            dev_eui,
            MAX_NESTING_DEPTH
        );
        return None;
    }
    match SessionRecordPb::decode(bytes) {
        Ok(pb) => Some(Box::new(from_pb(pb, depth + 1))),
        Err(e) => {
            log::warn!(
                "dev_eui={} pending-rejoin device-session decode error, ignored: {}",
                dev_eui,
                e
            );
            None
        }
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn sat_u8(v: u32) -> u8 {
    u8::try_from(v).unwrap_or(u8::MAX)
}

fn to_unix_ns(t: Option<DateTime<Utc>>) -> Result<Option<i64>, CodecError> {
    t.map(|t| t.timestamp_nanos_opt().ok_or(CodecError::TimestampOutOfRange(t)))
        .transpose()
}

fn from_unix_ns(ns: Option<i64>) -> Option<DateTime<Utc>> {
    ns.filter(|ns| *ns != GO_ZERO_TIME_UNIX_NS)
        .map(|ns| Utc.timestamp_nanos(ns))
}

//! CSV column table shared by `get-sessions -o csv` and `set-sessions`.
//!
//! Each column names its cell parser and two plain functions: one writing a
//! parsed value into a [`SessionRecord`], one rendering the field for export.
//! The table is fixed at compile time, so a header is validated once, before
//! any row is read.

use crate::lorawan::{AesKey, DevAddr, Eui64};
use crate::session::{KeyEnvelope, RxWindow, SessionRecord};

/// How a cell is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldParser {
    /// Signed decimal.
    Int,
    /// Unsigned decimal.
    Unsigned,
    /// `true`/`false`, `t`/`f` or `1`/`0`.
    Bool,
    /// Comma separated signed decimals.
    IntList,
    /// Hex string.
    HexBytes,
    /// Taken as is.
    Text,
}

/// A parsed cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Unsigned(u64),
    Bool(bool),
    IntList(Vec<i64>),
    Bytes(Vec<u8>),
    Text(String),
}

impl FieldParser {
    /// Parse a non-empty, trimmed cell.
    pub fn parse(self, cell: &str) -> Result<FieldValue, String> {
        match self {
            Self::Int => cell
                .parse()
                .map(FieldValue::Int)
                .map_err(|e| format!("not an integer: {e}")),
            Self::Unsigned => cell
                .parse()
                .map(FieldValue::Unsigned)
                .map_err(|e| format!("not an unsigned integer: {e}")),
            Self::Bool => match cell.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(FieldValue::Bool(true)),
                "0" | "f" | "false" => Ok(FieldValue::Bool(false)),
                _ => Err("not a boolean".to_string()),
            },
            Self::IntList => cell
                .split(',')
                .map(|n| n.trim().parse::<i64>().map_err(|e| format!("'{n}' is not an integer: {e}")))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::IntList),
            Self::HexBytes => hex::decode(cell)
                .map(FieldValue::Bytes)
                .map_err(|e| format!("not hex: {e}")),
            Self::Text => Ok(FieldValue::Text(cell.to_string())),
        }
    }
}

impl FieldValue {
    fn narrow<T: TryFrom<i128>>(wide: i128) -> Result<T, String> {
        T::try_from(wide).map_err(|_| format!("{wide} is out of range"))
    }

    fn integer<T: TryFrom<i128>>(self) -> Result<T, String> {
        match self {
            Self::Int(v) => Self::narrow(i128::from(v)),
            Self::Unsigned(v) => Self::narrow(i128::from(v)),
            other => Err(format!("expected a number, got {other:?}")),
        }
    }

    fn boolean(self) -> Result<bool, String> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(format!("expected a boolean, got {other:?}")),
        }
    }

    fn bytes(self) -> Result<Vec<u8>, String> {
        match self {
            Self::Bytes(b) => Ok(b),
            other => Err(format!("expected hex bytes, got {other:?}")),
        }
    }

    fn text(self) -> Result<String, String> {
        match self {
            Self::Text(s) => Ok(s),
            other => Err(format!("expected text, got {other:?}")),
        }
    }

    fn list<T: TryFrom<i128>>(self) -> Result<Vec<T>, String> {
        match self {
            Self::IntList(values) => values
                .into_iter()
                .map(|v| Self::narrow(i128::from(v)))
                .collect(),
            other => Err(format!("expected a list, got {other:?}")),
        }
    }

    fn eui(self) -> Result<Eui64, String> {
        Eui64::from_slice(&self.bytes()?).map_err(|e| e.to_string())
    }

    fn dev_addr(self) -> Result<DevAddr, String> {
        DevAddr::from_slice(&self.bytes()?).map_err(|e| e.to_string())
    }

    fn key(self) -> Result<AesKey, String> {
        AesKey::from_slice(&self.bytes()?).map_err(|e| e.to_string())
    }
}

/// Writes a parsed value into a record.
pub type Setter = fn(&mut SessionRecord, FieldValue) -> Result<(), String>;

/// Renders a record field as a cell.
pub type Getter = fn(&SessionRecord) -> String;

/// One CSV column.
pub struct Column {
    pub name: &'static str,
    pub parser: FieldParser,
    pub set: Setter,
    pub get: Getter,
}

fn envelope(r: &mut SessionRecord) -> &mut KeyEnvelope {
    r.app_s_key_envelope.get_or_insert_with(KeyEnvelope::default)
}

/// Columns in export order.
pub static SESSION_COLUMNS: &[Column] = &[
    Column {
        name: "MACVersion",
        parser: FieldParser::Text,
        set: |r, v| {
            r.mac_version = v.text()?;
            Ok(())
        },
        get: |r| r.mac_version.clone(),
    },
    Column {
        name: "DevEUI",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            r.dev_eui = v.eui()?;
            Ok(())
        },
        get: |r| r.dev_eui.to_string(),
    },
    Column {
        name: "DevAddr",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            r.dev_addr = v.dev_addr()?;
            Ok(())
        },
        get: |r| r.dev_addr.to_string(),
    },
    Column {
        name: "JoinEUI",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            r.join_eui = v.eui()?;
            Ok(())
        },
        get: |r| r.join_eui.to_string(),
    },
    Column {
        name: "TXPowerIndex",
        parser: FieldParser::Int,
        set: |r, v| {
            r.tx_power_index = v.integer()?;
            Ok(())
        },
        get: |r| r.tx_power_index.to_string(),
    },
    Column {
        name: "FCntUp",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.f_cnt_up = v.integer()?;
            Ok(())
        },
        get: |r| r.f_cnt_up.to_string(),
    },
    Column {
        name: "NFCntDown",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.n_f_cnt_down = v.integer()?;
            Ok(())
        },
        get: |r| r.n_f_cnt_down.to_string(),
    },
    Column {
        name: "AFCntDown",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.a_f_cnt_down = v.integer()?;
            Ok(())
        },
        get: |r| r.a_f_cnt_down.to_string(),
    },
    Column {
        name: "ConfFCnt",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.conf_f_cnt = v.integer()?;
            Ok(())
        },
        get: |r| r.conf_f_cnt.to_string(),
    },
    Column {
        name: "FNwkSIntKey",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            r.f_nwk_s_int_key = v.key()?;
            Ok(())
        },
        get: |r| r.f_nwk_s_int_key.to_string(),
    },
    Column {
        name: "SNwkSIntKey",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            r.s_nwk_s_int_key = v.key()?;
            Ok(())
        },
        get: |r| r.s_nwk_s_int_key.to_string(),
    },
    Column {
        name: "NwkSEncKey",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            r.nwk_s_enc_key = v.key()?;
            Ok(())
        },
        get: |r| r.nwk_s_enc_key.to_string(),
    },
    Column {
        name: "AppSKey",
        parser: FieldParser::HexBytes,
        set: |r, v| {
            envelope(r).aes_key = v.bytes()?;
            Ok(())
        },
        get: |r| {
            r.app_s_key_envelope
                .as_ref()
                .map(|e| hex::encode(&e.aes_key))
                .unwrap_or_default()
        },
    },
    Column {
        name: "KEKLabel",
        parser: FieldParser::Text,
        set: |r, v| {
            envelope(r).kek_label = v.text()?;
            Ok(())
        },
        get: |r| {
            r.app_s_key_envelope
                .as_ref()
                .map(|e| e.kek_label.clone())
                .unwrap_or_default()
        },
    },
    Column {
        name: "PingSlotNb",
        parser: FieldParser::Int,
        set: |r, v| {
            r.ping_slot_nb = v.integer()?;
            Ok(())
        },
        get: |r| r.ping_slot_nb.to_string(),
    },
    Column {
        name: "EnabledUplinkChannels",
        parser: FieldParser::IntList,
        set: |r, v| {
            r.enabled_uplink_channels = v.list()?;
            Ok(())
        },
        get: |r| {
            r.enabled_uplink_channels
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        },
    },
    Column {
        name: "IsDisabled",
        parser: FieldParser::Bool,
        set: |r, v| {
            r.is_disabled = v.boolean()?;
            Ok(())
        },
        get: |r| r.is_disabled.to_string(),
    },
    Column {
        name: "RXWindow",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.rx_window = RxWindow::from_u32(v.integer()?);
            Ok(())
        },
        get: |r| (r.rx_window as u32).to_string(),
    },
    Column {
        name: "RXDelay",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.rx_delay = v.integer()?;
            Ok(())
        },
        get: |r| r.rx_delay.to_string(),
    },
    Column {
        name: "RX1DROffset",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.rx1_dr_offset = v.integer()?;
            Ok(())
        },
        get: |r| r.rx1_dr_offset.to_string(),
    },
    Column {
        name: "RX2Frequency",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.rx2_frequency = v.integer()?;
            Ok(())
        },
        get: |r| r.rx2_frequency.to_string(),
    },
    Column {
        name: "RX2DR",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.rx2_dr = v.integer()?;
            Ok(())
        },
        get: |r| r.rx2_dr.to_string(),
    },
    Column {
        name: "NbTrans",
        parser: FieldParser::Unsigned,
        set: |r, v| {
            r.nb_trans = v.integer()?;
            Ok(())
        },
        get: |r| r.nb_trans.to_string(),
    },
    Column {
        name: "DR",
        parser: FieldParser::Int,
        set: |r, v| {
            r.dr = v.integer()?;
            Ok(())
        },
        get: |r| r.dr.to_string(),
    },
];

/// Column named `name`, if any.
#[must_use]
pub fn column(name: &str) -> Option<&'static Column> {
    SESSION_COLUMNS.iter().find(|c| c.name == name)
}

/// Header row in export order.
#[must_use]
pub fn header() -> Vec<&'static str> {
    SESSION_COLUMNS.iter().map(|c| c.name).collect()
}

/// Cells of `record` in export order.
#[must_use]
pub fn row(record: &SessionRecord) -> Vec<String> {
    SESSION_COLUMNS.iter().map(|c| (c.get)(record)).collect()
}

//! `set-sessions`: write sessions from a CSV file.
//!
//! The whole file is parsed before the store is touched. An unknown header
//! column or a malformed cell rejects the file. Rows whose device is not
//! registered on the network server are skipped.

pub mod columns;

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::session::SessionRecord;
use crate::sources::{IdentitySource, SourceError};
use crate::store::{SessionStore, StoreError};

use columns::Column;

/// Import failures.
#[derive(Debug, Error)]
pub enum ImportError {
    /// File unreadable.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Header names a column the importer does not know.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// The DevEUI column is absent.
    #[error("missing required column 'DevEUI'")]
    MissingDevEui,

    /// A cell could not be parsed or applied.
    #[error("row {row}, column '{column}': invalid value '{value}': {reason}")]
    InvalidCell {
        /// 1-based data row number
        row: usize,
        /// Column name
        column: &'static str,
        /// Cell text
        value: String,
        /// What was wrong
        reason: String,
    },

    /// A row has no DevEUI.
    #[error("row {0}: DevEUI is empty")]
    EmptyDevEui(usize),

    /// A session could not be written.
    #[error("saving failed: {0}")]
    Store(#[from] StoreError),
}

/// Amounts added to the imported counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterAdjust {
    /// Added to `FCntUp`.
    pub up: u32,
    /// Added to `NFCntDown`.
    pub down: u32,
}

/// Counts of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub rows: usize,
    pub saved: usize,
    pub skipped_unknown_device: usize,
    /// Rows skipped because the network-server lookup failed.
    pub source_errors: usize,
    pub index_write_failures: usize,
}

fn resolve_header(headers: &csv::StringRecord) -> Result<Vec<&'static Column>, ImportError> {
    let table = headers
        .iter()
        .map(|h| columns::column(h).ok_or_else(|| ImportError::UnknownColumn(h.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    if !table.iter().any(|c| c.name == "DevEUI") {
        return Err(ImportError::MissingDevEui);
    }
    Ok(table)
}

/// Parse session rows from CSV text.
pub fn parse_sessions<R: io::Read>(reader: R) -> Result<Vec<SessionRecord>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let table = resolve_header(csv_reader.headers()?)?;

    let mut records = Vec::new();
    for (i, result) in csv_reader.records().enumerate() {
        let row = i + 1;
        let cells = result?;
        let mut record = SessionRecord::default();
        let mut has_dev_eui = false;

        for (column, cell) in table.iter().zip(cells.iter()) {
            if cell.is_empty() {
                continue;
            }
            let invalid = |reason: String| ImportError::InvalidCell {
                row,
                column: column.name,
                value: cell.to_string(),
                reason,
            };
            let value = column.parser.parse(cell).map_err(invalid)?;
            (column.set)(&mut record, value).map_err(invalid)?;
            has_dev_eui |= column.name == "DevEUI";
        }

        if !has_dev_eui {
            return Err(ImportError::EmptyDevEui(row));
        }
        if record
            .app_s_key_envelope
            .as_ref()
            .is_some_and(|e| e.aes_key.is_empty())
        {
            record.app_s_key_envelope = None;
        }
        records.push(record);
    }

    log::debug!("{} session row(s) parsed", records.len());
    Ok(records)
}

/// Parse a session CSV file.
pub fn read_sessions(path: &Path) -> Result<Vec<SessionRecord>, ImportError> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_sessions(file)
}

/// Save `records`, taking profile IDs from the network server.
///
/// Counters are raised by `adjust` first. Each saved device's MAC-command
/// queue is flushed. Existing sessions are replaced.
pub fn import_sessions(
    store: &SessionStore,
    identity: &dyn IdentitySource,
    records: Vec<SessionRecord>,
    adjust: CounterAdjust,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport {
        rows: records.len(),
        ..Default::default()
    };

    for mut record in records {
        let dev_eui = record.dev_eui;
        let device = match identity.network_device(&dev_eui) {
            Ok(d) => d,
            Err(SourceError::NotFound) => {
                log::warn!("dev_eui={} row skipped: device not registered on the network server", dev_eui);
                report.skipped_unknown_device += 1;
                continue;
            }
            Err(e) => {
                log::error!("dev_eui={} row skipped: network-server lookup failed: {}", dev_eui, e);
                report.source_errors += 1;
                continue;
            }
        };

        record.device_profile_id = device.device_profile_id;
        record.service_profile_id = device.service_profile_id;
        record.routing_profile_id = device.routing_profile_id;
        record.f_cnt_up = record.f_cnt_up.saturating_add(adjust.up);
        record.n_f_cnt_down = record.n_f_cnt_down.saturating_add(adjust.down);

        let outcome = store.save(&record)?;
        if !outcome.is_complete() {
            report.index_write_failures += 1;
        }
        store.flush_mac_command_queue(&dev_eui)?;
        report.saved += 1;
        log::info!("dev_eui={} device-session set", dev_eui);
    }

    log::info!(
        "set {} out of {} session(s), {} skipped as unknown, {} lookup failure(s)",
        report.saved,
        report.rows,
        report.skipped_unknown_device,
        report.source_errors
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use uuid::Uuid;

    use crate::lorawan::{AesKey, Eui64};
    use crate::sources::{AppDevice, DeviceActivation, DeviceProfile, NetworkDevice};
    use crate::store::{KeyLayout, MemoryKv};

    const HEADER: &str = "MACVersion,DevEUI,DevAddr,FCntUp,NFCntDown,AppSKey,KEKLabel,EnabledUplinkChannels\n";

    #[test]
    fn test_parse_rows() {
        let text = format!(
            "{HEADER}1.0.3,aa00000000000001,11223344,41,9,{},,\"0,1,2\"\n",
            "0a".repeat(16)
        );
        let records = parse_sessions(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.dev_eui, Eui64([0xaa, 0, 0, 0, 0, 0, 0, 1]));
        assert_eq!(r.f_cnt_up, 41);
        assert_eq!(r.enabled_uplink_channels, vec![0, 1, 2]);
        assert_eq!(r.clear_app_s_key(), Some(AesKey([0x0a; 16])));
    }

    #[test]
    fn test_empty_app_s_key_means_no_envelope() {
        let text = format!("{HEADER}1.0.3,aa00000000000001,11223344,1,1,,kek,\n");
        let records = parse_sessions(text.as_bytes()).unwrap();
        assert!(records[0].app_s_key_envelope.is_none());
    }

    #[test]
    fn test_wrapped_key_keeps_label() {
        let text = format!(
            "{HEADER}1.1.0,aa00000000000001,11223344,1,1,{},kek-1,\n",
            "ab".repeat(24)
        );
        let records = parse_sessions(text.as_bytes()).unwrap();
        let env = records[0].app_s_key_envelope.as_ref().unwrap();
        assert_eq!(env.kek_label, "kek-1");
        assert_eq!(env.aes_key.len(), 24);
        assert_eq!(records[0].clear_app_s_key(), None);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = parse_sessions("DevEUI,Colour\naa00000000000001,red\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::UnknownColumn(c) if c == "Colour"));
    }

    #[test]
    fn test_malformed_cell_rejected() {
        let text = format!("{HEADER}1.0.3,aa00000000000001,11223344,lots,1,,,\n");
        let err = parse_sessions(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidCell {
                row: 1,
                column: "FCntUp",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_dev_eui_column() {
        let err = parse_sessions("MACVersion\n1.0.3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::MissingDevEui));
    }

    #[test]
    fn test_empty_dev_eui_cell() {
        let text = format!("{HEADER}1.0.3,,11223344,1,1,,,\n");
        let err = parse_sessions(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::EmptyDevEui(1)));
    }

    struct BrokenDatabase;

    impl IdentitySource for BrokenDatabase {
        fn application_device(&self, _: &Eui64) -> Result<AppDevice, SourceError> {
            Err(SourceError::NotFound)
        }

        fn network_device(&self, _: &Eui64) -> Result<NetworkDevice, SourceError> {
            Err(SourceError::InvalidData {
                column: "device_profile_id",
                reason: "not a uuid".into(),
            })
        }

        fn device_profile(&self, _: &Uuid) -> Result<DeviceProfile, SourceError> {
            Err(SourceError::NotFound)
        }

        fn last_activation(&self, _: &Eui64) -> Result<DeviceActivation, SourceError> {
            Err(SourceError::NotFound)
        }
    }

    #[test]
    fn test_lookup_failure_is_not_an_unknown_device() {
        let store = SessionStore::new(
            Box::new(MemoryKv::new()),
            KeyLayout {
                device_namespace: "lora:ns:device".into(),
                devaddr_namespace: "lora:ns:devaddr".into(),
                plan_id: "ru864".into(),
            },
            Duration::from_secs(60),
        );
        let record = SessionRecord {
            mac_version: "1.0.3".into(),
            dev_eui: Eui64([0xaa, 0, 0, 0, 0, 0, 0, 1]),
            ..Default::default()
        };

        let report =
            import_sessions(&store, &BrokenDatabase, vec![record], CounterAdjust::default()).unwrap();
        assert_eq!(report.saved, 0);
        assert_eq!(report.source_errors, 1);
        assert_eq!(report.skipped_unknown_device, 0);
    }
}

//! CSV export and `set-sessions` import.

use session_wrench::import::{import_sessions, parse_sessions, read_sessions, CounterAdjust, ImportError};
use session_wrench::output::{write_sessions, CsvOutput, OutputFormat};
use session_wrench::session::SessionRecord;
use session_wrench::store::MemoryKv;
use uuid::Uuid;

use super::fixtures::{addr, eui, session, store, World, APP_S_KEY, PROFILE_ID, SERVICE_PROFILE_ID};

#[test]
fn test_export_then_import() {
    let mut exported = session(eui(1), addr(1), 41, 9);
    // Profile IDs are not part of the CSV; the import takes them from the
    // network server.
    exported.device_profile_id = Uuid::nil();
    let csv_text = CsvOutput::new(std::slice::from_ref(&exported)).to_string().unwrap();

    let parsed = parse_sessions(csv_text.as_bytes()).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].dev_eui, eui(1));
    assert_eq!(parsed[0].clear_app_s_key(), Some(APP_S_KEY));
    assert_eq!(parsed[0].enabled_uplink_channels, vec![0, 1]);

    let world = World::new("1.0.3");
    world.register_network_only(eui(1));
    let sessions = store(&MemoryKv::new());
    let report = import_sessions(&sessions, &world.ids, parsed, CounterAdjust { up: 10, down: 5 }).unwrap();
    assert_eq!(report.saved, 1);

    let saved = sessions.get(&eui(1)).unwrap();
    assert_eq!(saved.f_cnt_up, 51);
    assert_eq!(saved.n_f_cnt_down, 14);
    assert_eq!(saved.device_profile_id, PROFILE_ID);
    assert_eq!(saved.service_profile_id, SERVICE_PROFILE_ID);
    assert_eq!(saved.rx2_frequency, 869_100_000);
}

#[test]
fn test_unregistered_rows_are_skipped() {
    let rows: Vec<SessionRecord> = vec![session(eui(1), addr(1), 1, 1), session(eui(2), addr(2), 1, 1)];
    let world = World::new("1.0.3");
    world.register_network_only(eui(2));

    let kv = MemoryKv::new();
    let sessions = store(&kv);
    let report = import_sessions(&sessions, &world.ids, rows, CounterAdjust::default()).unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(report.saved, 1);
    assert_eq!(report.skipped_unknown_device, 1);
    assert!(sessions.get(&eui(1)).is_err());
    assert!(sessions.get(&eui(2)).is_ok());
}

#[test]
fn test_import_replaces_existing_session() {
    let world = World::new("1.0.3");
    world.register_network_only(eui(1));
    let sessions = store(&MemoryKv::new());
    let _ = sessions.save(&session(eui(1), addr(1), 500, 500)).unwrap();

    import_sessions(
        &sessions,
        &world.ids,
        vec![session(eui(1), addr(1), 7, 7)],
        CounterAdjust::default(),
    )
    .unwrap();
    assert_eq!(sessions.get(&eui(1)).unwrap().f_cnt_up, 7);
}

#[test]
fn test_read_sessions_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.csv");
    std::fs::write(
        &path,
        "DevEUI,DevAddr,FCntUp,NFCntDown,RX2Frequency\naa00000000000003,26010003,100,20,869100000\n",
    )
    .unwrap();

    let records = read_sessions(&path).unwrap();
    assert_eq!(records[0].dev_eui, eui(3));
    assert_eq!(records[0].dev_addr, addr(3));
    assert_eq!(records[0].f_cnt_up, 100);
    assert!(records[0].app_s_key_envelope.is_none());
}

#[test]
fn test_read_sessions_missing_file() {
    let err = read_sessions(std::path::Path::new("/nonexistent/sessions.csv")).unwrap_err();
    assert!(matches!(err, ImportError::Io { .. }));
}

#[test]
fn test_csv_export_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = vec![session(eui(1), addr(1), 3, 4), session(eui(2), addr(2), 5, 6)];
    let mut stdout = Vec::new();

    let path = write_sessions(&sessions, OutputFormat::Csv, dir.path(), &mut stdout)
        .unwrap()
        .unwrap();
    assert!(stdout.is_empty());
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("sessions_") && name.ends_with(".csv"));

    let back = read_sessions(&path).unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[1].n_f_cnt_down, 6);
}

#[test]
fn test_json_export_lists_sessions() {
    let sessions = vec![session(eui(1), addr(1), 3, 4)];
    let mut stdout = Vec::new();
    let dir = tempfile::tempdir().unwrap();
    write_sessions(&sessions, OutputFormat::Json, dir.path(), &mut stdout).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&stdout).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 1);
    assert_eq!(value[0]["f_cnt_up"], 3);
    assert_eq!(value[0]["dev_eui"], "aa00000000000001");
}

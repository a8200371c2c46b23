//! Rebuilding sessions from the server databases and the frame log.

use session_wrench::batch::run_batch;
use session_wrench::config::NetworkSettings;
use session_wrench::error::ExitCode;
use session_wrench::lorawan::band::{Band, BandName};
use session_wrench::progress::NoProgress;
use session_wrench::restore::{ColdRebuild, Reconciler, SkipReason};
use session_wrench::store::MemoryKv;

use super::fixtures::{addr, at, eui, store, World, APP_S_KEY};

#[test]
fn test_rebuild_and_create() {
    let world = World::new("1.0.3");
    world.register(eui(1), addr(1), at(2024, 1, 5, 12));
    world.uplink(eui(1), 41);
    world.downlink(eui(1), 9, 0);
    // Only an uplink was ever logged for the second device.
    world.register(eui(2), addr(2), at(2024, 1, 5, 12));
    world.uplink(eui(2), 3);

    let band = Band::new(BandName::Ru864);
    let settings = NetworkSettings::default();
    let engine = ColdRebuild::new(&world.ids, &world.frames, &band, &settings);
    let kv = MemoryKv::new();
    let sessions = store(&kv);

    let report = run_batch(&engine, &sessions, &[eui(1), eui(2)], &NoProgress);

    assert_eq!(report.mode, "restore");
    assert_eq!(report.attempted, 2);
    assert_eq!(report.reconciled, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped.get("no_traffic"), Some(&1));
    assert_eq!(report.exit_code(), ExitCode::PartialSuccess);

    let saved = sessions.get(&eui(1)).unwrap();
    assert_eq!(saved.f_cnt_up, 42);
    assert_eq!(saved.n_f_cnt_down, 10);
    assert_eq!(saved.dev_addr, addr(1));
    assert_eq!(saved.clear_app_s_key(), Some(APP_S_KEY));
    assert!(sessions.get(&eui(2)).is_err());
    assert_eq!(sessions.device_ids_for_addr(&addr(1)).unwrap(), vec![eui(1)]);
}

#[test]
fn test_rerun_creates_nothing_new() {
    let world = World::new("1.0.3");
    world.register(eui(1), addr(1), at(2024, 1, 5, 12));
    world.uplink(eui(1), 41);
    world.downlink(eui(1), 9, 0);

    let band = Band::new(BandName::Ru864);
    let settings = NetworkSettings::default();
    let engine = ColdRebuild::new(&world.ids, &world.frames, &band, &settings);
    let kv = MemoryKv::new();
    let sessions = store(&kv);

    let first = run_batch(&engine, &sessions, &[eui(1)], &NoProgress);
    assert_eq!(first.exit_code(), ExitCode::Success);
    let keys_after_first = kv.keys();

    // Newer traffic must not leak into the already created session.
    world.uplink(eui(1), 100);
    let second = run_batch(&engine, &sessions, &[eui(1)], &NoProgress);
    assert_eq!(second.created, 0);
    assert_eq!(second.already_exists, 1);
    assert_eq!(second.exit_code(), ExitCode::NothingRestored);
    assert_eq!(kv.keys(), keys_after_first);
    assert_eq!(sessions.get(&eui(1)).unwrap().f_cnt_up, 42);
}

#[test]
fn test_nothing_reconciled_writes_nothing() {
    let world = World::new("1.0.3");
    world.register(eui(2), addr(2), at(2024, 1, 5, 12));
    world.uplink(eui(2), 3);

    let band = Band::new(BandName::Ru864);
    let settings = NetworkSettings::default();
    let engine = ColdRebuild::new(&world.ids, &world.frames, &band, &settings);
    let kv = MemoryKv::new();

    let report = run_batch(&engine, &store(&kv), &[eui(2), eui(7)], &NoProgress);
    assert_eq!(report.created, 0);
    assert_eq!(report.skipped_total(), 2);
    assert_eq!(report.skipped.get("unknown_application_device"), Some(&1));
    assert_eq!(report.exit_code(), ExitCode::NothingRestored);
    assert!(kv.is_empty());
}

#[test]
fn test_device_missing_on_network_server() {
    let world = World::new("1.0.3");
    world.register(eui(1), addr(1), at(2024, 1, 5, 12));
    let band = Band::new(BandName::Ru864);
    let settings = NetworkSettings::default();
    let engine = ColdRebuild::new(&world.ids, &world.frames, &band, &settings);

    // The application server alone knows about this one.
    world
        .ids
        .insert_application_device(&session_wrench::sources::AppDevice {
            dev_eui: eui(5),
            dev_addr: addr(5),
            app_s_key: APP_S_KEY,
            is_disabled: false,
        })
        .unwrap();
    assert_eq!(engine.reconcile(&eui(5)), Err(SkipReason::UnknownNetworkDevice));
}

#[test]
fn test_rebuilt_session_round_trips_through_store() {
    let world = World::new("1.1.0");
    world.register(eui(3), addr(3), at(2024, 1, 5, 12));
    world.uplink(eui(3), 7);
    world.downlink(eui(3), 2, 20);

    let band = Band::new(BandName::Ru864);
    let settings = NetworkSettings::default();
    let engine = ColdRebuild::new(&world.ids, &world.frames, &band, &settings);
    let record = engine.reconcile(&eui(3)).unwrap();

    let kv = MemoryKv::new();
    let sessions = store(&kv);
    let _ = sessions.save(&record).unwrap();
    let loaded = sessions.get(&eui(3)).unwrap();
    assert_eq!(loaded, record);
    assert_eq!(loaded.a_f_cnt_down, 21);
    assert_eq!(loaded.downlink_counter(), 21);
}

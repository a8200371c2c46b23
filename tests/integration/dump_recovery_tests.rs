//! Recovering sessions from an older dump of the store.

use session_wrench::batch::run_batch;
use session_wrench::error::ExitCode;
use session_wrench::progress::NoProgress;
use session_wrench::restore::dump::parse_cutoff;
use session_wrench::restore::{DumpRecovery, Reconciler, SkipReason};
use session_wrench::store::MemoryKv;

use super::fixtures::{addr, at, eui, session, store, World};

const CUTOFF: &str = "2024-03-01 10:00:00 +0000";

#[test]
fn test_dump_copy_is_restored_with_fresh_counters() {
    let world = World::new("1.0.3");
    world.register(eui(3), addr(3), at(2024, 2, 1, 0));
    world.uplink(eui(3), 120);
    world.downlink(eui(3), 60, 0);

    let dump_kv = MemoryKv::new();
    let dump = store(&dump_kv);
    let _ = dump.save(&session(eui(3), addr(3), 100, 50)).unwrap();
    let primary_kv = MemoryKv::new();
    let primary = store(&primary_kv);

    let engine = DumpRecovery::new(
        &primary,
        &dump,
        &world.ids,
        &world.frames,
        parse_cutoff(CUTOFF).unwrap(),
    );
    let report = run_batch(&engine, &primary, &[eui(3)], &NoProgress);

    assert_eq!(report.mode, "restore-from-dump");
    assert_eq!(report.exit_code(), ExitCode::Success);
    let restored = primary.get(&eui(3)).unwrap();
    assert_eq!(restored.f_cnt_up, 121);
    assert_eq!(restored.n_f_cnt_down, 61);
    assert_eq!(restored.dev_addr, addr(3));
    // The dump itself is only read.
    assert_eq!(dump.get(&eui(3)).unwrap().f_cnt_up, 100);
}

#[test]
fn test_join_after_dump_is_skipped() {
    let world = World::new("1.0.3");
    world.register(eui(3), addr(3), at(2024, 3, 5, 0));

    let dump = store(&MemoryKv::new());
    let _ = dump.save(&session(eui(3), addr(3), 100, 50)).unwrap();
    let primary_kv = MemoryKv::new();
    let primary = store(&primary_kv);

    let engine = DumpRecovery::new(
        &primary,
        &dump,
        &world.ids,
        &world.frames,
        parse_cutoff(CUTOFF).unwrap(),
    );
    let report = run_batch(&engine, &primary, &[eui(3)], &NoProgress);

    assert_eq!(report.skipped.get("newer_join_exists"), Some(&1));
    assert_eq!(report.exit_code(), ExitCode::NothingRestored);
    assert!(primary_kv.is_empty());
}

#[test]
fn test_cutoff_offset_is_honoured() {
    let world = World::new("1.0.3");
    // 09:30 UTC is before 13:00 +0300 (10:00 UTC).
    world.register(eui(3), addr(3), at(2024, 3, 1, 9));

    let dump = store(&MemoryKv::new());
    let _ = dump.save(&session(eui(3), addr(3), 1, 1)).unwrap();
    let primary = store(&MemoryKv::new());

    let engine = DumpRecovery::new(
        &primary,
        &dump,
        &world.ids,
        &world.frames,
        parse_cutoff("2024-03-01 13:00:00 +0300").unwrap(),
    );
    assert!(engine.reconcile(&eui(3)).is_ok());

    let earlier = DumpRecovery::new(
        &primary,
        &dump,
        &world.ids,
        &world.frames,
        parse_cutoff("2024-03-01 11:00:00 +0300").unwrap(),
    );
    assert_eq!(earlier.reconcile(&eui(3)), Err(SkipReason::NewerJoinExists));
}

#[test]
fn test_live_session_and_missing_copy() {
    let world = World::new("1.0.3");
    let dump = store(&MemoryKv::new());
    let _ = dump.save(&session(eui(1), addr(1), 5, 5)).unwrap();
    let primary = store(&MemoryKv::new());
    let _ = primary.save(&session(eui(1), addr(1), 9, 9)).unwrap();

    let engine = DumpRecovery::new(
        &primary,
        &dump,
        &world.ids,
        &world.frames,
        parse_cutoff(CUTOFF).unwrap(),
    );
    let outcome = engine.reconcile_all(&[eui(1), eui(2)], &NoProgress);

    assert!(outcome.records.is_empty());
    assert_eq!(
        outcome.skipped,
        vec![
            (eui(1), SkipReason::SessionExists),
            (eui(2), SkipReason::NoHistoricalCopy)
        ]
    );
    assert_eq!(primary.get(&eui(1)).unwrap().f_cnt_up, 9);
}

#[test]
fn test_malformed_cutoff_rejected() {
    for input in ["2024-03-01 10:00:00", "yesterday", "2024-03-01T10:00:00+00:00", ""] {
        assert!(parse_cutoff(input).is_err(), "accepted {input:?}");
    }
}

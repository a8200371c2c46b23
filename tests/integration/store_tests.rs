//! Session store behaviour over the in-memory backend.

use std::time::Duration;

use session_wrench::progress::NoProgress;
use session_wrench::restore::create_sessions;
use session_wrench::store::{KvBackend, MemoryKv, StoreError};

use super::fixtures::{addr, eui, layout, session, store};

#[test]
fn test_save_sets_ttl_on_record_and_index() {
    let kv = MemoryKv::new();
    let sessions = store(&kv);
    let outcome = sessions.save(&session(eui(1), addr(1), 1, 1)).unwrap();
    assert!(outcome.is_complete());

    let keys = layout();
    let record_ttl = kv.ttl(&keys.device_key(&eui(1))).unwrap();
    let index_ttl = kv.ttl(&keys.devaddr_key(&addr(1))).unwrap();
    assert!(record_ttl <= Duration::from_secs(3600));
    assert!(record_ttl > Duration::from_secs(3500));
    assert!(index_ttl > Duration::from_secs(3500));
}

#[test]
fn test_record_key_layout() {
    let kv = MemoryKv::new();
    let _ = store(&kv).save(&session(eui(1), addr(1), 1, 1)).unwrap();
    let keys = kv.keys();
    assert!(keys.contains(&"lora:ns:device:ru864:aa00000000000001".to_string()));
    assert!(keys.contains(&"lora:ns:devaddr:26010001".to_string()));
}

#[test]
fn test_shared_address_lists_every_device() {
    let kv = MemoryKv::new();
    let sessions = store(&kv);
    let _ = sessions.save(&session(eui(1), addr(9), 1, 1)).unwrap();
    let _ = sessions.save(&session(eui(2), addr(9), 1, 1)).unwrap();

    let mut ids = sessions.device_ids_for_addr(&addr(9)).unwrap();
    ids.sort();
    assert_eq!(ids, vec![eui(1), eui(2)]);
}

#[test]
fn test_pending_rejoin_address_is_indexed() {
    let kv = MemoryKv::new();
    let sessions = store(&kv);
    let mut record = session(eui(1), addr(1), 1, 1);
    record.pending_rejoin = Some(Box::new(session(eui(1), addr(2), 0, 0)));
    let _ = sessions.save(&record).unwrap();

    assert_eq!(sessions.device_ids_for_addr(&addr(2)).unwrap(), vec![eui(1)]);
    assert_eq!(sessions.get(&eui(1)).unwrap().nesting_depth(), 1);
}

#[test]
fn test_missing_record_is_not_found() {
    let sessions = store(&MemoryKv::new());
    assert!(matches!(
        sessions.get(&eui(4)),
        Err(StoreError::NotFound(id)) if id == eui(4)
    ));
}

#[test]
fn test_corrupt_record_is_decode_error() {
    let kv = MemoryKv::new();
    kv.set_with_ttl(
        &layout().device_key(&eui(1)),
        &[0xff, 0xff, 0xff],
        Duration::from_secs(60),
    )
    .unwrap();
    assert!(matches!(
        store(&kv).get(&eui(1)),
        Err(StoreError::Decode { .. })
    ));
}

#[test]
fn test_index_failure_keeps_record() {
    let kv = MemoryKv::new();
    kv.fail_set_writes(true);
    let sessions = store(&kv);

    let report = create_sessions(&sessions, &[session(eui(1), addr(1), 1, 1)], &NoProgress).unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.index_write_failures, 1);
    assert!(sessions.get(&eui(1)).is_ok());
    assert!(sessions.device_ids_for_addr(&addr(1)).unwrap().is_empty());
}

#[test]
fn test_create_flushes_mac_command_queue() {
    let kv = MemoryKv::new();
    let queue = layout().mac_queue_key(&eui(1));
    kv.set_with_ttl(&queue, b"pending", Duration::from_secs(60)).unwrap();

    let report = create_sessions(&store(&kv), &[session(eui(1), addr(1), 1, 1)], &NoProgress).unwrap();
    assert_eq!(report.created, 1);
    assert!(kv.get(&queue).unwrap().is_none());
}

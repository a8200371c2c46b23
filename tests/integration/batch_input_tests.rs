//! Device-list files.

use std::fs;

use session_wrench::batch::{read_device_list, BatchInputError};
use session_wrench::error::ExitCode;
use tempfile::tempdir;

use super::fixtures::eui;

#[test]
fn test_read_list_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.txt");
    fs::write(&path, "aa00000000000001\n\\xaa00000000000002\r\nAA00000000000003").unwrap();

    let devices = read_device_list(&path).unwrap();
    assert_eq!(devices, vec![eui(1), eui(2), eui(3)]);
}

#[test]
fn test_malformed_line_aborts_whole_batch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.txt");
    fs::write(&path, "aa00000000000001\naa0000000000zz02\naa00000000000003\n").unwrap();

    let err = read_device_list(&path).unwrap_err();
    match &err {
        BatchInputError::InvalidLine { line, content, .. } => {
            assert_eq!(*line, 2);
            assert_eq!(content, "aa0000000000zz02");
        }
        other => panic!("Expected InvalidLine, got {:?}", other),
    }
    assert_eq!(
        ExitCode::for_error(&anyhow::Error::new(err)),
        ExitCode::InvalidInput
    );
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let err = read_device_list(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, BatchInputError::Io { .. }));
}

#[test]
fn test_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.txt");
    fs::write(&path, "").unwrap();
    assert!(matches!(read_device_list(&path), Err(BatchInputError::Empty)));
}

#[test]
fn test_duplicates_are_kept_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.txt");
    fs::write(&path, "aa00000000000002\naa00000000000001\naa00000000000002\n").unwrap();
    assert_eq!(read_device_list(&path).unwrap(), vec![eui(2), eui(1), eui(2)]);
}

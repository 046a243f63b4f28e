//! Config store error-message, atomic-write-safety, and validation tests.

use std::fs;

use assert_fs::prelude::*;
use gitsync_core::{
    config::{self, MAX_INTERVAL_SECS, MIN_INTERVAL_SECS},
    BranchStrategy, ConfigError, Direction, RepositorySyncSpec, SyncConfig,
};
use predicates::prelude::predicate;
use rstest::rstest;

fn single_repo_config(interval: u64) -> SyncConfig {
    let mut repo = RepositorySyncSpec::new("/code/copnow_api");
    repo.interval = Some(interval);
    SyncConfig {
        repositories: vec![repo],
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// 1. Interval bounds
// ---------------------------------------------------------------------------

#[rstest]
#[case(0)]
#[case(1)]
#[case(MIN_INTERVAL_SECS - 1)]
#[case(MAX_INTERVAL_SECS + 1)]
#[case(7 * 86_400)]
fn interval_outside_bounds_is_rejected(#[case] interval: u64) {
    let err = single_repo_config(interval).validate().unwrap_err();
    assert_eq!(err.repository, Some(0));
    assert!(err.message.contains("interval"), "got: {err}");
}

#[rstest]
#[case(MIN_INTERVAL_SECS)]
#[case(300)]
#[case(MAX_INTERVAL_SECS)]
fn interval_inside_bounds_is_accepted(#[case] interval: u64) {
    single_repo_config(interval).validate().expect("valid interval");
}

// ---------------------------------------------------------------------------
// 2. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn unknown_direction_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("repositories:\n  - path: /code/app\n    direction: bogus\n")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn corrupt_yaml_returns_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn invalid_value_returns_validation_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("repositories:\n  - path: /code/app\n    interval: 5\n")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)), "got: {err}");
    assert!(err.to_string().contains("repository 0"));
}

// ---------------------------------------------------------------------------
// 3. Defaults and idempotence
// ---------------------------------------------------------------------------

#[test]
fn partial_file_is_filled_with_defaults() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("global:\n  max_concurrent_syncs: 2\nrepositories:\n  - path: /code/app\n")
        .expect("write");

    let config = config::load_at(file.path()).expect("load");
    assert_eq!(config.global.max_concurrent_syncs, 2);
    assert_eq!(config.global.history_retention_days, 30);

    let repo = &config.repositories[0];
    assert!(repo.enabled);
    assert_eq!(repo.direction, Direction::Both);
    assert_eq!(repo.remote, "origin");
    assert_eq!(repo.branch_strategy, BranchStrategy::Current);
    assert!(repo.safety_checks);
    assert!(!repo.force_push);
    assert_eq!(repo.interval_secs(&config.global), 300);
}

#[test]
fn repeated_loads_are_stable() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");

    let mut original = single_repo_config(60);
    original.repositories[0].direction = Direction::Push;
    config::save_at(&path, &original).expect("save");

    let first = config::load_at(&path).expect("first load");
    let bytes = fs::read(&path).expect("read");
    let second = config::load_at(&path).expect("second load");

    assert_eq!(first, original);
    assert_eq!(first, second);
    assert_eq!(bytes, fs::read(&path).expect("re-read"), "load must not rewrite the file");
}

// ---------------------------------------------------------------------------
// 4. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_cleans_up_tmp_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    config::save_at(&path, &single_repo_config(60)).expect("save");

    dir.child("config.yaml").assert(predicate::path::exists());
    dir.child("config.yaml.tmp").assert(predicate::path::missing());
}

#[test]
fn mid_write_crash_leaves_original_intact() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    config::save_at(&path, &single_repo_config(60)).expect("save");
    let original_bytes = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = dir.path().join("config.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original_bytes, fs::read(&path).expect("read after crash"));
    let loaded = config::load_at(&path).expect("original still loads");
    assert_eq!(loaded.repositories.len(), 1);
}

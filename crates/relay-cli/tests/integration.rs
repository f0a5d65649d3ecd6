#![allow(deprecated)]
use assert_cmd::Command;
use chrono::{Duration, Utc};
use predicates::prelude::*;
use relay_core::record::{PendingRecord, RecordState, SubjectRef};
use relay_core::store::{RecordStore, SqliteRecordStore};
use tempfile::TempDir;

const CONFIG: &str = "\
context:
  fallback_channel_id: \"fallback-1\"
review:
  reviewer_roles: [staff]
";

fn relay(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.current_dir(dir.path())
        .env("RELAY_CONFIG", dir.path().join("relay.yaml"))
        .env_remove("DISCORD_TOKEN");
    cmd
}

/// A token is enough for `decide`: with nothing cached there is no card to
/// edit, so no request leaves the process.
fn relay_with_token(dir: &TempDir) -> Command {
    let mut cmd = relay(dir);
    cmd.env("DISCORD_TOKEN", "test-token");
    cmd
}

fn configured() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("relay.yaml"), CONFIG).unwrap();
    dir
}

fn store(dir: &TempDir) -> SqliteRecordStore {
    SqliteRecordStore::open(&dir.path().join("records.db")).unwrap()
}

fn submit(dir: &TempDir, id: &str) {
    let record = PendingRecord::new(id, SubjectRef::new("1042"), Utc::now() - Duration::minutes(5));
    store(dir).insert(&record).unwrap();
}

// ---------------------------------------------------------------------------
// relay init / config
// ---------------------------------------------------------------------------

#[test]
fn init_writes_default_config() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    let yaml = std::fs::read_to_string(dir.path().join("relay.yaml")).unwrap();
    assert!(yaml.contains("poll_seconds: 60"));
    assert!(yaml.contains("Training Case for C{subject}"));
}

#[test]
fn init_does_not_overwrite() {
    let dir = configured();
    relay(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("relay.yaml")).unwrap(),
        CONFIG
    );
}

#[test]
fn validate_flags_missing_context() {
    let dir = TempDir::new().unwrap();
    relay(&dir).arg("init").assert().success();
    relay(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn validate_accepts_usable_config() {
    let dir = configured();
    relay(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No warnings"));
}

#[test]
fn commands_without_config_explain_init() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["cache", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("relay init"));
}

// ---------------------------------------------------------------------------
// relay tick / cache
// ---------------------------------------------------------------------------

#[test]
fn dry_run_tick_announces_without_remembering() {
    let dir = configured();
    submit(&dir, "R1");

    relay(&dir)
        .args(["tick", "--dry-run", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"announced\": 1"));

    relay(&dir)
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No announcements"));
}

#[test]
fn tick_without_token_fails() {
    let dir = configured();
    relay(&dir)
        .arg("tick")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DISCORD_TOKEN"));
}

#[test]
fn cache_evict_unknown_id_fails() {
    let dir = configured();
    relay(&dir)
        .args(["cache", "evict", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("announcement not found"));
}

#[test]
fn cache_list_and_evict() {
    let dir = configured();
    std::fs::write(
        dir.path().join("pending_cache.json"),
        r#"{"R1":{"locationId":"c1","messageId":"m1"}}"#,
    )
    .unwrap();

    relay(&dir)
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("R1").and(predicate::str::contains("m1")));

    relay(&dir).args(["cache", "evict", "R1"]).assert().success();

    let doc = std::fs::read_to_string(dir.path().join("pending_cache.json")).unwrap();
    assert!(!doc.contains("R1"));
}

// ---------------------------------------------------------------------------
// relay record / decide
// ---------------------------------------------------------------------------

#[test]
fn record_list_shows_pending() {
    let dir = configured();
    submit(&dir, "R1");
    submit(&dir, "R2");
    store(&dir).force_state("R2", RecordState::Accepted).unwrap();

    relay(&dir)
        .args(["record", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("R1").and(predicate::str::contains("R2").not()));
}

#[test]
fn force_state_changes_the_store() {
    let dir = configured();
    submit(&dir, "R1");
    relay(&dir)
        .args(["record", "force-state", "R1", "deleted"])
        .assert()
        .success();
    assert_eq!(store(&dir).state("R1").unwrap(), Some(RecordState::Deleted));
}

#[test]
fn force_state_rejects_unknown_names() {
    let dir = configured();
    submit(&dir, "R1");
    relay(&dir)
        .args(["record", "force-state", "R1", "approved-ish"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid record state"));
}

#[test]
fn decide_applies_once() {
    let dir = configured();
    submit(&dir, "R1");

    relay_with_token(&dir)
        .args(["decide", "R1", "accept", "--actor", "Alex", "--role", "staff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved"));
    assert_eq!(store(&dir).state("R1").unwrap(), Some(RecordState::Accepted));

    relay_with_token(&dir)
        .args(["decide", "R1", "reject", "--actor", "Sam", "--role", "staff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already resolved"));
    assert_eq!(store(&dir).state("R1").unwrap(), Some(RecordState::Accepted));
}

#[test]
fn decide_has_no_dry_run() {
    let dir = configured();
    submit(&dir, "R1");
    relay_with_token(&dir)
        .args(["decide", "R1", "accept", "--actor", "Alex", "--role", "staff", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dry-run"));
    assert_eq!(store(&dir).state("R1").unwrap(), Some(RecordState::Pending));
}

#[test]
fn decide_needs_a_token() {
    let dir = configured();
    submit(&dir, "R1");
    relay(&dir)
        .args(["decide", "R1", "accept", "--actor", "Alex", "--role", "staff"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DISCORD_TOKEN"));
    assert_eq!(store(&dir).state("R1").unwrap(), Some(RecordState::Pending));
}

#[test]
fn decide_without_role_is_refused() {
    let dir = configured();
    submit(&dir, "R1");
    relay_with_token(&dir)
        .args(["decide", "R1", "accept", "--actor", "Mallory"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("permission"));
    assert_eq!(store(&dir).state("R1").unwrap(), Some(RecordState::Pending));
}

//! Black-box CLI tests. No Postgres instance is spun up here: every
//! scenario below fails before the first connection attempt, so these stay
//! fast and hermetic via `assert_cmd` + `tempfile`, the way the rest of the
//! dev-dependency stack is used elsewhere in this crate.

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn bin() -> Command {
    Command::cargo_bin("caweb-migrate").unwrap()
}

const VALID_V2_CONFIG: &str = "\
versions:
  config: 2.1.0
  database: 2.0.0
database:
  host: db.example
  port: 5432
  name: caweb
  pass-dir: /etc/caweb/pass
usecases:
  cars:
    delay-of-old-parking-method: 2s
";

#[test]
fn migrate_rejects_malformed_yaml_with_exit_code_64() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.yaml");
    let target = dir.path().join("target.yaml");
    std::fs::write(&source, "not: [valid, yaml: structure").unwrap();
    std::fs::write(&target, VALID_V2_CONFIG).unwrap();

    bin()
        .args([
            "migrate",
            "--source-config",
            source.to_str().unwrap(),
            "--target-config",
            target.to_str().unwrap(),
        ])
        .assert()
        .code(64);
}

#[test]
fn migrate_rejects_same_source_and_target_endpoint() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.yaml");
    let target = dir.path().join("target.yaml");
    std::fs::write(&source, VALID_V2_CONFIG).unwrap();
    std::fs::write(&target, VALID_V2_CONFIG).unwrap();

    // Both configs name the same host:port/db, which is rejected before any
    // connection is attempted, so this stays hermetic.
    bin()
        .args([
            "migrate",
            "--source-config",
            source.to_str().unwrap(),
            "--target-config",
            target.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("source and target both name"));
}

#[test]
fn migrate_with_missing_config_file_fails_with_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.yaml");
    let target = dir.path().join("target.yaml");
    std::fs::write(&target, VALID_V2_CONFIG).unwrap();

    bin()
        .args([
            "migrate",
            "--source-config",
            missing.to_str().unwrap(),
            "--target-config",
            target.to_str().unwrap(),
        ])
        .assert()
        .code(70);
}

#[test]
fn missing_subcommand_is_a_clap_usage_error() {
    bin().assert().failure();
}

#[test]
fn init_with_missing_config_file_fails_with_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.yaml");

    bin()
        .args(["init", "--config", missing.to_str().unwrap()])
        .assert()
        .code(70);
}

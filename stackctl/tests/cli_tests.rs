use assert_cmd::Command;
use predicates::prelude::*;

const EXIT_CONFIG: i32 = 78;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("stackctl.json");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_help_shows_usage() {
    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Supervise"));
}

#[test]
fn test_check_accepts_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        &dir,
        r#"{"units": [{"name": "app-server", "command": "sleep 30"}]}"#,
    );

    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"));
}

#[test]
fn test_check_rejects_unknown_signal() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        &dir,
        r#"{"units": [{"name": "app-server", "command": "sleep 30", "graceful_signal": "BOGUS"}]}"#,
    );

    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("--check")
        .assert()
        .code(EXIT_CONFIG);
}

#[test]
fn test_check_rejects_empty_unit_list() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, r#"{"units": []}"#);

    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("--check")
        .assert()
        .code(EXIT_CONFIG);
}

#[test]
fn test_check_rejects_zero_match_log_glob() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        &dir,
        &format!(
            r#"{{"log_globs": ["{}/none/*.log"], "units": [{{"name": "app-server", "command": "sleep 30"}}]}}"#,
            dir.path().display()
        ),
    );

    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("--check")
        .assert()
        .code(EXIT_CONFIG);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let mut cmd = Command::cargo_bin("stackctl").unwrap();
    cmd.arg("--config")
        .arg("/nonexistent/stackctl.json")
        .assert()
        .code(EXIT_CONFIG);
}

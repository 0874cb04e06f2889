use stackctl_core::{GRACEFUL_ENV, PollBounds, SessionConfig, Signal, parse_bool_flag};
use std::time::Duration;

fn parse(json: &str) -> SessionConfig {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_minimal_unit_defaults() {
    let config = parse(
        r#"{
            "units": [
                {"name": "app-server", "command": "puma"}
            ]
        }"#,
    );

    assert!(config.graceful_shutdown);
    assert!(config.log_globs.is_empty());

    let unit = &config.units[0];
    assert_eq!(unit.command, "puma");
    assert!(unit.args.is_empty());
    assert_eq!(unit.graceful_signal, None);
    assert_eq!(unit.forceful_signal, Signal::SIGTERM);
    assert_eq!(unit.startup, PollBounds::default());
    assert_eq!(unit.liveness, PollBounds::default());
    assert!(unit.pid_file.is_none());
}

#[test]
fn test_full_unit_parse() {
    let config = parse(
        r#"{
            "graceful_shutdown": false,
            "log_globs": ["log/*.log"],
            "log_poll_ms": 100,
            "units": [
                {
                    "name": "app-server",
                    "command": "puma",
                    "args": ["-C", "config/puma.rb"],
                    "env": {"RACK_ENV": "production"},
                    "cwd": "/srv/app",
                    "pid_file": "/srv/app/tmp/puma.pid",
                    "graceful_signal": "QUIT",
                    "forceful_signal": "TERM",
                    "startup_poll_ms": 50,
                    "startup_attempts": 40,
                    "liveness_poll_ms": 25,
                    "liveness_attempts": 80
                }
            ]
        }"#,
    );

    assert!(!config.graceful_shutdown);
    assert_eq!(config.log_globs, vec!["log/*.log".to_string()]);
    assert_eq!(config.log_poll_ms, 100);

    let unit = &config.units[0];
    assert_eq!(unit.graceful_signal, Some(Signal::SIGQUIT));
    assert_eq!(unit.forceful_signal, Signal::SIGTERM);
    assert_eq!(unit.env.get("RACK_ENV").unwrap(), "production");
    assert_eq!(
        unit.startup,
        PollBounds::new(Duration::from_millis(50), 40)
    );
    assert_eq!(
        unit.liveness,
        PollBounds::new(Duration::from_millis(25), 80)
    );
}

#[test]
fn test_command_split_with_shell_words() {
    let config = parse(
        r#"{
            "units": [
                {"name": "app", "command": "puma -C 'my config.rb'"}
            ]
        }"#,
    );

    let unit = &config.units[0];
    assert_eq!(unit.command, "puma");
    assert_eq!(unit.args, vec!["-C".to_string(), "my config.rb".to_string()]);
}

#[test]
fn test_explicit_args_leave_command_untouched() {
    let config = parse(
        r#"{
            "units": [
                {"name": "app", "command": "puma -C config.rb", "args": []}
            ]
        }"#,
    );

    assert_eq!(config.units[0].command, "puma -C config.rb");
    assert!(config.units[0].args.is_empty());
}

#[test]
fn test_unknown_signal_is_a_parse_error() {
    let result: Result<SessionConfig, _> = serde_json::from_str(
        r#"{
            "units": [
                {"name": "app", "command": "puma", "graceful_signal": "NOPE"}
            ]
        }"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_validate_rejects_empty_unit_list() {
    let config = parse(r#"{"units": []}"#);
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_duplicate_names() {
    let config = parse(
        r#"{
            "units": [
                {"name": "app", "command": "puma"},
                {"name": "App", "command": "nginx"}
            ]
        }"#,
    );
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_blank_command() {
    let config = parse(
        r#"{
            "units": [
                {"name": "app", "command": "   "}
            ]
        }"#,
    );
    assert!(config.validate().is_err());
}

#[test]
fn test_parse_bool_flag() {
    assert_eq!(parse_bool_flag("1"), Some(true));
    assert_eq!(parse_bool_flag("true"), Some(true));
    assert_eq!(parse_bool_flag("ON"), Some(true));
    assert_eq!(parse_bool_flag("0"), Some(false));
    assert_eq!(parse_bool_flag("no"), Some(false));
    assert_eq!(parse_bool_flag(" Off "), Some(false));
    assert_eq!(parse_bool_flag("maybe"), None);
    assert_eq!(parse_bool_flag(""), None);
}

#[tokio::test]
async fn test_load_applies_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stackctl.json");
    std::fs::write(
        &path,
        r#"{
            "graceful_shutdown": true,
            "units": [
                {"name": "app", "command": "puma"}
            ]
        }"#,
    )
    .unwrap();

    unsafe { std::env::set_var(GRACEFUL_ENV, "off") };
    let config = SessionConfig::load(&path).await.unwrap();
    unsafe { std::env::remove_var(GRACEFUL_ENV) };

    assert!(!config.graceful_shutdown);
}

#[tokio::test]
async fn test_load_missing_file_is_config_error() {
    let result = SessionConfig::load("/nonexistent/stackctl.json").await;
    assert!(matches!(result, Err(stackctl_core::Error::Config(_))));
}

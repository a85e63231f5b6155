//! Tests for config module

use invitekeeper::config::Config;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

const ENV_KEYS: &[&str] = &[
    "INVITEKEEPER_API_URL",
    "INVITEKEEPER_TOKEN",
    "INVITEKEEPER_SQLITE_PATH",
    "INVITEKEEPER_WAIT_SECS",
    "INVITEKEEPER_COOLDOWN_DAYS",
    "INVITEKEEPER_PORT",
    "INVITEKEEPER_LOG_FORMAT",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_toml_loads_and_validates() {
    clear_env();
    let config = Config::from_file(std::path::Path::new("config.toml"))
        .expect("config.toml in the project root should parse");

    assert!(config.validate().is_ok());
    assert_eq!(config.manager.standard_wait(), Duration::from_secs(5));
    assert_eq!(config.manager.liveness_threshold(), chrono::Duration::minutes(6));
    assert_eq!(config.notifications.cooldown(), chrono::Duration::days(15));
    assert_eq!(config.manager.startup_delay(), Duration::from_secs(60));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[remote]
api_url = "https://chat.example.com/api"
token = "from-file"
timeout_secs = 10
max_retries = 1

[database]
sqlite_path = "/tmp/from-file.db"
"#
    )
    .unwrap();

    std::env::set_var("INVITEKEEPER_TOKEN", "from-env");
    std::env::set_var("INVITEKEEPER_WAIT_SECS", "9");
    std::env::set_var("INVITEKEEPER_PORT", "9100");
    let config = Config::from_file(file.path()).unwrap();
    clear_env();

    assert_eq!(config.remote.api_url, "https://chat.example.com/api");
    assert_eq!(config.remote.token, "from-env");
    assert_eq!(config.manager.wait_secs, 9);
    assert_eq!(config.server.port, 9100);
    // Sections missing from the file fall back to defaults
    assert_eq!(config.notifications.cooldown_days, 15);
    assert_eq!(config.logging.format, "text");
}

#[test]
#[serial]
fn test_from_env_uses_defaults() {
    clear_env();
    std::env::set_var("INVITEKEEPER_SQLITE_PATH", "/var/lib/invitekeeper/keeper.db");
    std::env::set_var("INVITEKEEPER_LOG_FORMAT", "json");
    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(
        config.database.sqlite_path,
        std::path::PathBuf::from("/var/lib/invitekeeper/keeper.db")
    );
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.manager.fast_retry(), Duration::from_millis(1));
}

#[test]
#[serial]
fn test_unparseable_env_value_is_ignored() {
    clear_env();
    std::env::set_var("INVITEKEEPER_COOLDOWN_DAYS", "fortnight");
    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.notifications.cooldown_days, 15);
}

#[test]
#[serial]
fn test_invalid_cooldown_rejected() {
    clear_env();
    std::env::set_var("INVITEKEEPER_COOLDOWN_DAYS", "0");
    let config = Config::from_env().unwrap();
    clear_env();

    assert!(config.validate().is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let err = Config::from_file(std::path::Path::new("does/not/exist.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

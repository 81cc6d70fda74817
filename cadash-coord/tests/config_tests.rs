//! Loading the coordination config from disk

use cadash_common::config::CONFIG_ENV_VAR;
use cadash_coord::config::CoordConfig;
use cadash_coord::CoordError;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn test_load_from_env_var() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cadash.toml");
    std::fs::write(
        &path,
        r#"
[logging]
level = "cadash_coord=debug,info"

[fetch]
min_request_interval_ms = 1000
settle_delay_ms = 250

[fetch.rate_limit]
capacity = 10
refill_per_second = 2.0

[upload]
max_file_size_bytes = 10485760

[store]
base_url = "https://example.supabase.co/rest/v1"
api_key = "anon"
"#,
    )
    .unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let config = CoordConfig::load(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    let config = config.unwrap();
    assert_eq!(config.logging.level, "cadash_coord=debug,info");
    assert_eq!(config.fetch.min_request_interval(), Duration::from_secs(1));
    assert_eq!(config.fetch.settle_delay(), Duration::from_millis(250));
    assert_eq!(config.fetch.context_min_interval(), Duration::from_millis(2500));
    assert_eq!(config.fetch.rate_limit.capacity, 10);
    assert_eq!(config.upload.max_file_size_bytes, 10 * 1024 * 1024);
    assert_eq!(config.store.api_key.as_deref(), Some("anon"));
}

#[test]
#[serial]
fn test_invalid_values_rejected_on_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cadash.toml");
    std::fs::write(&path, "[fetch.rate_limit]\ncapacity = 0\n").unwrap();

    let result = CoordConfig::load(Some(&path));
    assert!(matches!(result, Err(CoordError::InvalidConfig(_))));
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cadash.toml");
    std::fs::write(&path, "[fetch\npage_size = 3").unwrap();

    assert!(matches!(CoordConfig::load(Some(&path)), Err(CoordError::Common(_))));
}

#[test]
#[serial]
fn test_vanishing_refill_rate_rejected_on_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cadash.toml");
    std::fs::write(&path, "[fetch.rate_limit]\nrefill_per_second = 1e-300\n").unwrap();

    assert!(matches!(CoordConfig::load(Some(&path)), Err(CoordError::InvalidConfig(_))));
}

//! Integration tests for configuration loading
//!
//! Tests parsing, defaults for missing sections, validation failures and
//! saving to disk.

use pendrive::DriverConfig;
use std::fs;
use std::time::Duration;

const FULL_CONFIG: &str = r#"
[driver]
log_level = "debug"

[usb]
enumerate_existing = false
event_timeout_ms = 250
"#;

#[test]
fn test_load_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendrive.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = DriverConfig::load(Some(path)).unwrap();

    assert_eq!(config.driver.log_level, "debug");
    assert!(!config.usb.enumerate_existing);
    let settings = config.usb.core_settings();
    assert_eq!(settings.event_timeout, Duration::from_millis(250));
}

#[test]
fn test_missing_sections_use_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendrive.toml");
    fs::write(&path, "[driver]\nlog_level = \"warn\"\n").unwrap();

    let config = DriverConfig::load(Some(path)).unwrap();

    assert_eq!(config.driver.log_level, "warn");
    assert!(config.usb.enumerate_existing);
    assert_eq!(config.usb.event_timeout_ms, 100);
}

#[test]
fn test_empty_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendrive.toml");
    fs::write(&path, "").unwrap();

    let config = DriverConfig::load(Some(path)).unwrap();
    assert_eq!(config, DriverConfig::default());
}

#[test]
fn test_invalid_log_level_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendrive.toml");
    fs::write(&path, "[driver]\nlog_level = \"loud\"\n").unwrap();

    let err = DriverConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid log level"));
}

#[test]
fn test_invalid_timeout_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendrive.toml");
    fs::write(&path, "[usb]\nevent_timeout_ms = 0\n").unwrap();

    assert!(DriverConfig::load(Some(path)).is_err());
}

#[test]
fn test_malformed_toml_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendrive.toml");
    fs::write(&path, "[driver\nlog_level = ").unwrap();

    let err = DriverConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");

    assert!(DriverConfig::load(Some(path)).is_err());
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("pendrive.toml");

    let mut config = DriverConfig::default();
    config.driver.log_level = "trace".to_string();
    config.save(&path).unwrap();

    let loaded = DriverConfig::load(Some(path)).unwrap();
    assert_eq!(loaded, config);
}

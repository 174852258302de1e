//! Driver configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use usbcore::CoreSettings;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound for `usb.event_timeout_ms`
const MAX_EVENT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "DriverSettings::default_log_level")]
    pub log_level: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl DriverSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Offer devices connected before startup to the driver
    #[serde(default = "UsbSettings::default_enumerate_existing")]
    pub enumerate_existing: bool,
    /// Longest wait for libusb events before checking for commands
    #[serde(default = "UsbSettings::default_event_timeout_ms")]
    pub event_timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            enumerate_existing: Self::default_enumerate_existing(),
            event_timeout_ms: Self::default_event_timeout_ms(),
        }
    }
}

impl UsbSettings {
    fn default_enumerate_existing() -> bool {
        true
    }

    fn default_event_timeout_ms() -> u64 {
        100
    }

    /// Settings for the USB core thread
    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            enumerate_existing: self.enumerate_existing,
            event_timeout: Duration::from_millis(self.event_timeout_ms),
        }
    }
}

impl DriverConfig {
    /// Load configuration from file
    ///
    /// Without an explicit path, the user config and then the system config
    /// are tried; defaults are used when neither exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => expand_path(&p),
            None => {
                let candidates = [Self::default_path(), Self::system_path()];
                match candidates.into_iter().find(|p| p.exists()) {
                    Some(p) => p,
                    None => {
                        tracing::debug!("No config file found, using defaults");
                        return Ok(Self::default());
                    }
                }
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DriverConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if it cannot be read
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Per-user configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pendrive").join("pendrive.toml")
        } else {
            PathBuf::from(".config/pendrive/pendrive.toml")
        }
    }

    /// System-wide configuration file path
    pub fn system_path() -> PathBuf {
        PathBuf::from("/etc/pendrive/pendrive.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.driver.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.driver.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        if self.usb.event_timeout_ms == 0 || self.usb.event_timeout_ms > MAX_EVENT_TIMEOUT_MS {
            return Err(anyhow!(
                "Invalid event_timeout_ms {}, must be between 1 and {}",
                self.usb.event_timeout_ms,
                MAX_EVENT_TIMEOUT_MS
            ));
        }

        Ok(())
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.driver.log_level, "info");
        assert!(config.usb.enumerate_existing);
        assert_eq!(config.usb.event_timeout_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DriverConfig::default();

        config.driver.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.driver.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_event_timeout() {
        let mut config = DriverConfig::default();

        config.usb.event_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.usb.event_timeout_ms = MAX_EVENT_TIMEOUT_MS + 1;
        assert!(config.validate().is_err());

        config.usb.event_timeout_ms = MAX_EVENT_TIMEOUT_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_core_settings() {
        let settings = UsbSettings {
            enumerate_existing: false,
            event_timeout_ms: 250,
        }
        .core_settings();
        assert!(!settings.enumerate_existing);
        assert_eq!(settings.event_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_config_serialization() {
        let config = DriverConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DriverConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path(Path::new("~/pendrive.toml"));
        assert!(!expanded.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());

        let absolute = expand_path(Path::new("/etc/pendrive/pendrive.toml"));
        assert_eq!(absolute, PathBuf::from("/etc/pendrive/pendrive.toml"));
    }
}

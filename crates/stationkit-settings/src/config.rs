//! Configuration for StationKit
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into two sections:
//! - Link settings (baud rate, timeouts, retry budget, motion polling)
//! - Discovery settings (vendor/product filter, preferred devices, cache)

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use stationkit_core::DEFAULT_FEED_RATE;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform config dir
pub const APP_DIR: &str = "stationkit";
/// Config file name
pub const CONFIG_FILE: &str = "stationkit.toml";
/// Port cache file name
pub const PORT_CACHE_FILE: &str = "port_finder.json";

/// Serial link and motion timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Baud rate for the serial link
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
    /// Reconnect attempts after the first failed open
    pub max_retries: u32,
    /// Wait after every successful open, for controllers that reset on open
    pub settle_delay_ms: u64,
    /// Timeout of the open-and-close availability probe
    pub probe_timeout_ms: u64,
    /// Read timeout applied to each status query
    pub status_timeout_ms: u64,
    /// Interval between status polls while a move runs
    pub poll_interval_ms: u64,
    /// Added to the estimated travel time before the poll gives up
    pub motion_margin_ms: u64,
    /// Upper bound on waiting for the homing acknowledgement
    pub homing_timeout_ms: u64,
    /// Feed rate used when a move does not specify one
    pub default_feed_rate: f64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            timeout_ms: 1000,
            max_retries: 3,
            settle_delay_ms: 2000,
            probe_timeout_ms: 500,
            status_timeout_ms: 1000,
            poll_interval_ms: 500,
            motion_margin_ms: 5000,
            homing_timeout_ms: 120_000,
            default_feed_rate: DEFAULT_FEED_RATE,
        }
    }
}

impl LinkSettings {
    /// I/O timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Settle delay as a duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Probe timeout as a duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Status read timeout as a duration
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Motion safety margin as a duration
    pub fn motion_margin(&self) -> Duration {
        Duration::from_millis(self.motion_margin_ms)
    }

    /// Homing timeout as a duration
    pub fn homing_timeout(&self) -> Duration {
        Duration::from_millis(self.homing_timeout_ms)
    }

    /// Validate link settings
    pub fn validate(&self) -> SettingsResult<()> {
        if self.baud_rate == 0 {
            return Err(invalid("link.baud_rate", "must be > 0"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("link.timeout_ms", "must be > 0"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(invalid("link.probe_timeout_ms", "must be > 0"));
        }
        if self.status_timeout_ms == 0 {
            return Err(invalid("link.status_timeout_ms", "must be > 0"));
        }
        if self.homing_timeout_ms == 0 {
            return Err(invalid("link.homing_timeout_ms", "must be > 0"));
        }
        if !(self.default_feed_rate.is_finite() && self.default_feed_rate > 0.0) {
            return Err(invalid("link.default_feed_rate", "must be a positive number"));
        }
        Ok(())
    }
}

/// Port discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Exact USB vendor id to match
    pub vid: Option<u16>,
    /// Exact USB product id to match
    pub pid: Option<u16>,
    /// Substrings of known device labels to prefer (e.g. "Arduino")
    pub preferred_devices: Vec<String>,
    /// Skip Bluetooth, loopback and network ports
    pub skip_virtual: bool,
    /// Consult the port cache before scanning
    pub use_cache: bool,
    /// Location of the port cache file
    pub cache_path: PathBuf,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            vid: None,
            pid: None,
            preferred_devices: Vec::new(),
            skip_virtual: true,
            use_cache: true,
            cache_path: default_cache_path(),
        }
    }
}

impl DiscoverySettings {
    /// Validate discovery settings
    pub fn validate(&self) -> SettingsResult<()> {
        if self.vid.is_some() != self.pid.is_some() {
            return Err(invalid(
                "discovery.vid",
                "vid and pid must be given together",
            ));
        }
        if self.cache_path.as_os_str().is_empty() {
            return Err(invalid("discovery.cache_path", "must not be empty"));
        }
        Ok(())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Serial link settings
    pub link: LinkSettings,
    /// Discovery settings
    pub discovery: DiscoverySettings,
}

impl Config {
    /// Platform config file location, e.g. `~/.config/stationkit/stationkit.toml`
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load config from file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::ConfigDirectory(e.to_string()))?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        self.link.validate()?;
        self.discovery.validate()
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

fn invalid(key: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Platform config directory for StationKit, relative fallback if unknown
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(APP_DIR))
}

/// Default location of the port cache file
pub fn default_cache_path() -> PathBuf {
    config_dir().join(PORT_CACHE_FILE)
}

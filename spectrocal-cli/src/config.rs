//! Configuration file support for spectrocal.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SPECTROCAL_*)
//! 3. Local config file (./spectrocal.toml)
//! 4. Global config file (~/.config/spectrocal/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use spectrocal::UsbId;
use std::fs;
use std::path::{Path, PathBuf};

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "spectrocal.toml";

/// Serial port settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Fixed serial port (e.g., "/dev/ttyUSB0" or "COM3"); skips discovery.
    pub serial: Option<String>,
}

/// Adapter identity override, as hex strings (`"10C4"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbConfig {
    /// USB Vendor ID.
    pub vid: Option<String>,
    /// USB Product ID.
    pub pid: Option<String>,
}

/// CSV export settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving the CSV files.
    pub dir: Option<PathBuf>,
}

/// Defaults for the collection prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    /// Device model being collected.
    pub device: Option<String>,
    /// Batch label, e.g. "passes" or "fails".
    pub metric: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Adapter identity.
    #[serde(default)]
    pub usb: UsbConfig,
    /// Export configuration.
    #[serde(default)]
    pub export: ExportConfig,
    /// Station prompt defaults.
    #[serde(default)]
    pub station: StationConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .map_err(|e| warn!("Failed to parse config file {}: {e}", path.display()))
                .ok(),
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Parse TOML content.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "spectrocal").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Adapter identity, falling back to the instrument's CP210x bridge for
    /// missing or malformed fields.
    pub fn usb_id(&self) -> UsbId {
        let mut id = UsbId::default();
        if let Some(vid) = &self.usb.vid {
            match UsbId::parse_hex(vid) {
                Ok(vid) => id.vid = vid,
                Err(e) => warn!("Ignoring [usb] vid: {e}"),
            }
        }
        if let Some(pid) = &self.usb.pid {
            match UsbId::parse_hex(pid) {
                Ok(pid) => id.pid = pid,
                Err(e) => warn!("Ignoring [usb] pid: {e}"),
            }
        }
        id
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.port.serial.is_some() {
            self.port.serial = other.port.serial;
        }
        if other.usb.vid.is_some() {
            self.usb.vid = other.usb.vid;
        }
        if other.usb.pid.is_some() {
            self.usb.pid = other.usb.pid;
        }
        if other.export.dir.is_some() {
            self.export.dir = other.export.dir;
        }
        if other.station.device.is_some() {
            self.station.device = other.station.device;
        }
        if other.station.metric.is_some() {
            self.station.metric = other.station.metric;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.port.serial.is_none());
        assert!(config.export.dir.is_none());
        assert!(config.station.device.is_none());
        assert_eq!(config.usb_id(), UsbId::INSTRUMENT_ADAPTER);
    }

    #[test]
    fn test_parse_all_sections() {
        let config = Config::parse(
            r#"
            [port]
            serial = "/dev/ttyUSB2"

            [usb]
            vid = "10c4"
            pid = "EA61"

            [export]
            dir = "/tmp/scans"

            [station]
            device = "spectro-one"
            metric = "passes"
            "#,
        )
        .unwrap();

        assert_eq!(config.port.serial.as_deref(), Some("/dev/ttyUSB2"));
        assert_eq!(config.usb_id(), UsbId::new(0x10C4, 0xEA61));
        assert_eq!(config.export.dir, Some(PathBuf::from("/tmp/scans")));
        assert_eq!(config.station.device.as_deref(), Some("spectro-one"));
        assert_eq!(config.station.metric.as_deref(), Some("passes"));
    }

    #[test]
    fn test_parse_empty_is_default() {
        let config = Config::parse("").unwrap();
        assert!(config.port.serial.is_none());
        assert!(config.usb.vid.is_none());
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(Config::parse("invalid toml [[[").is_err());
    }

    #[test]
    fn test_malformed_usb_id_falls_back() {
        let config = Config::parse("[usb]\nvid = \"xyz\"\n").unwrap();
        assert_eq!(config.usb_id(), UsbId::INSTRUMENT_ADAPTER);
    }

    #[test]
    fn test_merge_overrides_only_set_fields() {
        let mut base = Config::parse(
            "[port]\nserial = \"COM1\"\n[station]\ndevice = \"spectro-one\"\nmetric = \"fails\"\n",
        )
        .unwrap();
        let local = Config::parse("[station]\nmetric = \"passes\"\n").unwrap();

        base.merge(local);
        assert_eq!(base.port.serial.as_deref(), Some("COM1"));
        assert_eq!(base.station.device.as_deref(), Some("spectro-one"));
        assert_eq!(base.station.metric.as_deref(), Some("passes"));
    }

    #[test]
    fn test_load_from_path_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[export]\ndir = \"out\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.export.dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_load_from_missing_path_is_default() {
        let dir = tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("missing.toml"));
        assert!(config.port.serial.is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.port.serial = Some("COM3".to_string());
        config.station.metric = Some("passes".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::parse(&text).unwrap();
        assert_eq!(back.port.serial.as_deref(), Some("COM3"));
        assert_eq!(back.station.metric.as_deref(), Some("passes"));
    }
}

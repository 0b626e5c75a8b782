//! xidctl settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xid_protocol::BaudRate;
use xid_sim::VirtualDeviceConfig;

/// Settings read from `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// How often `listen` polls each device
    pub poll_interval_ms: u64,
    /// Ports whose name contains one of these are never probed
    pub skip_patterns: Vec<String>,
    /// JSON device table used instead of the built-in one
    pub device_table: Option<PathBuf>,
    /// Half period of `flash`
    pub flash_interval_ms: u64,
    /// Devices attached in `--simulate` mode, one port each
    pub simulated_devices: Vec<VirtualDeviceConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            skip_patterns: vec!["Bluetooth".to_string(), "debug".to_string()],
            device_table: None,
            flash_interval_ms: 250,
            simulated_devices: vec![
                VirtualDeviceConfig::default(),
                VirtualDeviceConfig {
                    name: "StimTracker Duo".to_string(),
                    product_id: b'S',
                    model_id: b'1',
                    major_version: 2,
                    minor_version: 0,
                    output_lines: 16,
                    baud: BaudRate::B115200,
                    protocol_mode: 0,
                },
            ],
        }
    }
}

impl Settings {
    /// Get the XDG config directory for xidctl
    /// Uses $XDG_CONFIG_HOME/xidctl, falls back to ~/.config/xidctl
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("xidctl"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("xidctl"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|s| Self::from_json(&s))
            .unwrap_or_default()
    }

    /// Parse settings, falling back to defaults on malformed input
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring malformed settings: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<PathBuf, String> {
        let path =
            Self::settings_path().ok_or_else(|| "Could not determine settings path".to_string())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(&path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::from_json(r#"{ "poll_interval_ms": 50 }"#);
        assert_eq!(settings.poll_interval_ms, 50);
        assert_eq!(settings.flash_interval_ms, 250);
        assert_eq!(settings.simulated_devices.len(), 2);
    }

    #[test]
    fn test_malformed_json_gives_defaults() {
        assert_eq!(Settings::from_json("{ not json"), Settings::default());
    }

    #[test]
    fn test_round_trip() {
        let settings = Settings {
            device_table: Some(PathBuf::from("/tmp/devices.json")),
            skip_patterns: Vec::new(),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(Settings::from_json(&json), settings);
    }
}

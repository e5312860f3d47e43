//! Viewer configuration and settings store.
//!
//! The same TOML file serves as config and as the persistent settings
//! store: the manual address and both selection slots are written back
//! whenever the manager reports a change, so they survive restarts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use xtex_core::{ManagerConfig, Selection, protocol};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Persisted window selection.
    pub selection: SelectionConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Manual plugin address; empty = automatic BECN discovery.
    pub manual_address: String,
    /// Plugin TCP port.
    pub port: u16,
    /// Seconds to wait for a beacon before reporting a timeout.
    pub becn_timeout_secs: u64,
}

/// The two selected window indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub window_1: usize,
    pub window_2: usize,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            selection: SelectionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            manual_address: String::new(),
            port: protocol::PLUGIN_PORT,
            becn_timeout_secs: 10,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { window_1: 0, window_2: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading / saving ─────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current settings back to disk.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Manager startup knobs derived from the stored settings.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            port: self.network.port,
            manual_address: self.network.manual_address.clone(),
            selection: Selection {
                slot_a: self.selection.window_1,
                slot_b: self.selection.window_2,
            },
        }
    }
}

/// Tracks the config path so settings writes land where the config
/// was read from.
pub struct SettingsStore {
    path: PathBuf,
    config: ViewerConfig,
}

impl SettingsStore {
    pub fn new(path: PathBuf, config: ViewerConfig) -> Self {
        Self { path, config }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.config.selection.window_1 = selection.slot_a;
        self.config.selection.window_2 = selection.slot_b;
        self.persist();
    }

    pub fn set_manual_address(&mut self, address: String) {
        self.config.network.manual_address = address;
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.config.save(&self.path) {
            tracing::warn!("failed to save settings to {}: {e}", self.path.display());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("manual_address"));
        assert!(text.contains("window_1"));
    }

    #[test]
    fn roundtrip_config() {
        let mut cfg = ViewerConfig::default();
        cfg.network.manual_address = "192.168.1.50".into();
        cfg.selection.window_2 = 3;
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.manual_address, "192.168.1.50");
        assert_eq!(parsed.network.port, xtex_core::PLUGIN_PORT);
        assert_eq!(parsed.selection.window_2, 3);
    }

    #[test]
    fn manager_config_carries_selection() {
        let mut cfg = ViewerConfig::default();
        cfg.selection.window_1 = 2;
        cfg.selection.window_2 = 4;
        let mc = cfg.manager_config();
        assert_eq!(mc.selection, Selection { slot_a: 2, slot_b: 4 });
    }
}

//! Daemon configuration
//!
//! Loaded from a TOML file; individual fields can be overridden from the
//! command line by the daemon binary.

use std::path::{Path, PathBuf};

use reactor_bus::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Configuration for the console daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Task box id in the backend
    #[serde(default = "default_box_id")]
    pub id: String,

    /// Panel name in the device description file
    #[serde(default = "default_panel")]
    pub panel: String,

    /// Device description file path
    #[serde(default = "default_devices_path")]
    pub devices: PathBuf,

    /// Bus transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Backend synchronization configuration
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_box_id() -> String {
    "reactorconsole".to_string()
}

fn default_panel() -> String {
    "rod_control_panel".to_string()
}

fn default_devices_path() -> PathBuf {
    PathBuf::from("devices.yml")
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            id: default_box_id(),
            panel: default_panel(),
            devices: default_devices_path(),
            transport: TransportConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

/// Backend synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the game-state server; required unless `mock` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Use the file-based mock backend instead of HTTP
    #[serde(default)]
    pub mock: bool,

    /// Initial state document for the mock backend (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_init: Option<serde_json::Value>,

    /// How often to poll the backend for changes, seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Extra delay between writes of dirty state, seconds
    #[serde(default)]
    pub write_interval_secs: f64,
}

fn default_poll_interval() -> f64 {
    10.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            mock: false,
            mock_init: None,
            poll_interval_secs: default_poll_interval(),
            write_interval_secs: 0.0,
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))
    }
}

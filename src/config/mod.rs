//! Configuration module for fieldnet
//!
//! This module handles:
//! - Engine settings (clock defaults, stop timeout, event capacity, logging)
//! - Network configurations written and read by
//!   [`Network`](crate::graph::Network)
//!
//! # Settings Location
//!
//! Engine settings live in the platform config directory:
//! - **Linux**: `~/.config/fieldnet/settings.toml`
//! - **macOS**: `~/Library/Application Support/fieldnet/settings.toml`
//! - **Windows**: `%APPDATA%\fieldnet\settings.toml`
//!
//! # Example
//!
//! ```ignore
//! use fieldnet::config::EngineSettings;
//!
//! let settings = EngineSettings::load_or_default(EngineSettings::default_path()?);
//! let network = Network::with_settings(settings);
//! ```

pub mod network;

pub use network::*;

use crate::error::{FieldNetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory name under the platform config directory
pub const APP_DIR: &str = "fieldnet";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default period for manual triggers, in milliseconds
pub const DEFAULT_PERIOD_MS: u64 = 10;

/// Default time allowed for a looped trigger's thread to stop
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 2000;

/// Default capacity of each event subscription
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default number of deferred elements remembered per wave origin
pub const DEFAULT_DEFERRED_LIMIT: usize = 256;

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// `dt` handed to steps by manually triggered waves
    pub default_period_ms: u64,
    /// How long `stop()` waits for a looped trigger's thread
    pub stop_timeout_ms: u64,
    /// Capacity of each event subscription channel
    pub event_channel_capacity: usize,
    /// Directory for rolling log files (console only when unset)
    pub log_directory: Option<PathBuf>,
    /// Maximum deferred elements remembered per wave origin
    pub deferred_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_period_ms: DEFAULT_PERIOD_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
            log_directory: None,
            deferred_limit: DEFAULT_DEFERRED_LIMIT,
        }
    }
}

impl EngineSettings {
    pub fn default_period(&self) -> Duration {
        Duration::from_millis(self.default_period_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FieldNetError::Config(format!("Failed to read settings {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            FieldNetError::Config(format!("Failed to parse settings {:?}: {}", path, e))
        })
    }

    /// Load settings, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FieldNetError::Config(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| FieldNetError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            FieldNetError::Config(format!("Failed to write settings {:?}: {}", path, e))
        })
    }
}

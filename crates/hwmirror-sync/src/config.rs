//! # Mirror Configuration
//!
//! Configuration for the monitor agent, the event feed and the settings
//! store.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HWMIRROR_FEED_MODE=immediate                                       │
//! │     HWMIRROR_UPDATE_INTERVAL_MS=500                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hwmirror/mirror.toml (Linux)                             │
//! │     ~/Library/Application Support/org.hwmirror.hwmirror/mirror.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     1 s updates, buffered feed with a 5 s window, every category on    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # mirror.toml
//! [monitor]
//! update_interval_ms = 1000
//! command_buffer = 256
//! rescan_interval_secs = 10
//!
//! [feed]
//! mode = "buffered"  # buffered | immediate
//! window_ms = 5000
//!
//! [categories]
//! mainboard = true
//! cpu = true
//! ram = true
//! gpu = true
//! fan_controller = false
//! storage = true
//!
//! [history]
//! enabled = true
//!
//! [store]
//! database_path = "/var/lib/hwmirror/settings.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use hwmirror_core::CategoryFlags;

use crate::agent::MonitorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::feed::{FeedConfig, FeedMode, DEFAULT_FEED_WINDOW_MS};
use crate::remote::RemoteConfig;

// =============================================================================
// Monitor Settings
// =============================================================================

/// Update loop settings shared by the monitor and remote agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Period of the sensor update walk.
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u64,

    /// Capacity of each agent's command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// How often the host re-enumerates engine hardware (0 disables).
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,
}

fn default_update_interval() -> u64 {
    1_000
}

fn default_command_buffer() -> usize {
    256
}

fn default_rescan_interval() -> u64 {
    10
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval(),
            command_buffer: default_command_buffer(),
            rescan_interval_secs: default_rescan_interval(),
        }
    }
}

// =============================================================================
// Feed Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default)]
    pub mode: FeedMode,

    /// Buffering window (Buffered mode only).
    #[serde(default = "default_window")]
    pub window_ms: u64,
}

fn default_window() -> u64 {
    DEFAULT_FEED_WINDOW_MS
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            mode: FeedMode::default(),
            window_ms: default_window(),
        }
    }
}

// =============================================================================
// Category Settings
// =============================================================================

/// Which hardware categories are shown when the tree opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySettings {
    #[serde(default = "default_true")]
    pub mainboard: bool,
    #[serde(default = "default_true")]
    pub cpu: bool,
    #[serde(default = "default_true")]
    pub ram: bool,
    #[serde(default = "default_true")]
    pub gpu: bool,
    #[serde(default = "default_true")]
    pub fan_controller: bool,
    #[serde(default = "default_true")]
    pub storage: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            mainboard: true,
            cpu: true,
            ram: true,
            gpu: true,
            fan_controller: true,
            storage: true,
        }
    }
}

impl CategorySettings {
    pub fn flags(&self) -> CategoryFlags {
        CategoryFlags {
            mainboard: self.mainboard,
            cpu: self.cpu,
            ram: self.ram,
            gpu: self.gpu,
            fan_controller: self.fan_controller,
            storage: self.storage,
        }
    }
}

// =============================================================================
// History / Store Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    /// When false, sensors keep current/min/max but record no history.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite file holding names, overrides and packed histories.
    /// Defaults to `settings.db` in the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Config
// =============================================================================

/// Complete mirror configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub feed: FeedSettings,

    #[serde(default)]
    pub categories: CategorySettings,

    #[serde(default)]
    pub history: HistorySettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl MirrorConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (mirror.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> MirrorResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading mirror config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load mirror config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> MirrorResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| MirrorError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MirrorError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| MirrorError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Mirror config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.monitor.update_interval_ms == 0 {
            return Err(MirrorError::InvalidConfig(
                "update_interval_ms must be greater than 0".into(),
            ));
        }

        if self.monitor.command_buffer == 0 {
            return Err(MirrorError::InvalidConfig(
                "command_buffer must be greater than 0".into(),
            ));
        }

        if self.feed.mode == FeedMode::Buffered && self.feed.window_ms == 0 {
            return Err(MirrorError::InvalidConfig(
                "window_ms must be greater than 0 in buffered mode".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(interval) = std::env::var("HWMIRROR_UPDATE_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => {
                    debug!(ms, "Overriding update interval from environment");
                    self.monitor.update_interval_ms = ms;
                }
                Err(_) => warn!(value = %interval, "Invalid HWMIRROR_UPDATE_INTERVAL_MS"),
            }
        }

        if let Ok(mode) = std::env::var("HWMIRROR_FEED_MODE") {
            match mode.parse::<FeedMode>() {
                Ok(parsed) => {
                    debug!(mode = %parsed, "Overriding feed mode from environment");
                    self.feed.mode = parsed;
                }
                Err(e) => warn!(error = %e, "Unknown feed mode in environment"),
            }
        }

        if let Ok(window) = std::env::var("HWMIRROR_FEED_WINDOW_MS") {
            if let Ok(ms) = window.parse::<u64>() {
                self.feed.window_ms = ms;
            }
        }

        if let Ok(path) = std::env::var("HWMIRROR_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.database_path = Some(PathBuf::from(path));
        }

        if let Ok(history) = std::env::var("HWMIRROR_HISTORY") {
            match history.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => self.history.enabled = true,
                "0" | "false" | "off" => self.history.enabled = false,
                _ => warn!(value = %history, "Invalid HWMIRROR_HISTORY"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("org", "hwmirror", "hwmirror")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("mirror.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database file to open: the configured path, else the platform data
    /// directory, else the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("settings.db")))
            .unwrap_or_else(|| PathBuf::from("settings.db"))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.update_interval_ms)
    }

    pub fn feed_config(&self) -> FeedConfig {
        match self.feed.mode {
            FeedMode::Immediate => FeedConfig::immediate(),
            FeedMode::Buffered => FeedConfig::buffered(self.feed.window_ms),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            update_interval: self.update_interval(),
            command_buffer: self.monitor.command_buffer,
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            update_interval: self.update_interval(),
            command_buffer: self.monitor.command_buffer,
        }
    }

    /// Period of the host's hardware rescan, if enabled.
    pub fn rescan_interval(&self) -> Option<Duration> {
        match self.monitor.rescan_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

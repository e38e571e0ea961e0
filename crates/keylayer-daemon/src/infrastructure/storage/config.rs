//! TOML-based configuration persistence for the KeyLayer daemon.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KeyLayer\config.toml`
//! - Linux:    `~/.config/keylayer/config.toml`
//! - macOS:    `~/Library/Application Support/KeyLayer/config.toml`
//!
//! # Example
//!
//! ```toml
//! [daemon]
//! log_level = "debug"
//! scan_interval_secs = 5
//!
//! [capture]
//! inactivity_threshold_ms = 10000
//! extra_keyboard_vendors = [0x1A2C]
//!
//! [[devices]]
//! device = "1A2C:2124:USB Macro Pad"
//! auto_isolate = true
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a missing file, a
//! missing section, or a file written by an older version all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keylayer_core::DeviceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::capture_session::CaptureSettings;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Default name of the profile file inside the config directory.
pub const PROFILES_FILE_NAME: &str = "profiles.json";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub macros: MacroConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// General daemon behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Schema version string – bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between device scans.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Release every isolated device when the daemon exits.
    #[serde(default = "default_true")]
    pub release_on_exit: bool,
    /// Profile file; relative paths are resolved against the config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles_file: Option<PathBuf>,
}

/// Capture session timing and device detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    /// Silence after which a session restarts its readers.
    #[serde(default = "default_inactivity_threshold_ms")]
    pub inactivity_threshold_ms: u64,
    #[serde(default = "default_restart_settle_ms")]
    pub restart_settle_ms: u64,
    /// Upper bound on one blocking HID read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Vendor ids treated as keyboards even without keyboard usage.
    #[serde(default)]
    pub extra_keyboard_vendors: Vec<u16>,
}

/// Macro engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroConfig {
    #[serde(default = "default_true")]
    pub recording_enabled: bool,
}

/// Per-device settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    /// Device id in `VVVV:PPPP:Product Name` form.
    pub device: DeviceId,
    /// Isolate the device as soon as it is seen.
    #[serde(default)]
    pub auto_isolate: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_scan_interval_secs() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_watchdog_interval_ms() -> u64 {
    1_000
}
fn default_inactivity_threshold_ms() -> u64 {
    10_000
}
fn default_restart_settle_ms() -> u64 {
    500
}
fn default_read_timeout_ms() -> u64 {
    100
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
            scan_interval_secs: default_scan_interval_secs(),
            release_on_exit: default_true(),
            profiles_file: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_ms: default_watchdog_interval_ms(),
            inactivity_threshold_ms: default_inactivity_threshold_ms(),
            restart_settle_ms: default_restart_settle_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            extra_keyboard_vendors: Vec::new(),
        }
    }
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            recording_enabled: default_true(),
        }
    }
}

impl CaptureConfig {
    /// Converts the millisecond fields into session settings.  Zero intervals
    /// are raised to 1 ms.
    pub fn settings(&self) -> CaptureSettings {
        let ms = |v: u64| Duration::from_millis(v.max(1));
        CaptureSettings {
            watchdog_interval: ms(self.watchdog_interval_ms),
            inactivity_threshold: ms(self.inactivity_threshold_ms),
            restart_settle_delay: Duration::from_millis(self.restart_settle_ms),
            read_timeout: ms(self.read_timeout_ms),
        }
    }
}

impl AppConfig {
    /// Devices configured for automatic isolation.
    pub fn auto_isolate_devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices
            .iter()
            .filter(|d| d.auto_isolate)
            .map(|d| &d.device)
    }

    /// The profile file, resolved against `config_dir` when relative.
    pub fn profiles_path(&self, config_dir: &Path) -> PathBuf {
        match &self.daemon.profiles_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join(PROFILES_FILE_NAME),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads `AppConfig` from the platform config file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the directory if needed.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `KeyLayer` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeyLayer"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keylayer"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KeyLayer")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! TOML-based configuration for the order board.
//!
//! Read from `--config <path>` when given, otherwise from the platform
//! config directory:
//! - Linux:    `$XDG_CONFIG_HOME/orderboard/config.toml` or `~/.config/orderboard/config.toml`
//! - macOS:    `~/Library/Application Support/OrderBoard/config.toml`
//! - Windows:  `%APPDATA%\OrderBoard\config.toml`
//!
//! Every section and every field has a default, so a missing file, an empty
//! file and a partial file all produce a working configuration:
//!
//! ```toml
//! [network]
//! port = 5000
//!
//! [wireless]
//! enabled = false
//!
//! [timeouts]
//! idle_ms = 8000
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use orderboard_core::protocol::{DecodeOptions, DEFAULT_RFCOMM_CHANNEL, DEFAULT_TCP_PORT};
use orderboard_core::{LayoutError, LayoutPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::board::BoardLabels;
use crate::infrastructure::network::listener::{ListenerOptions, ListenerTimeouts};

/// Highest RFCOMM channel number.
const MAX_RFCOMM_CHANNEL: u8 = 30;

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

    /// The layout section describes an impossible board.
    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),

    /// A value is out of range.
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub wireless: WirelessConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// Presentation and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Heading above the in-progress orders.
    #[serde(default = "default_active_title")]
    pub active_title: String,
    /// Heading above the ready orders.
    #[serde(default = "default_completed_title")]
    pub completed_title: String,
}

/// TCP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Pending-connection queue length.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

/// Bluetooth RFCOMM listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WirelessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// RFCOMM channel, 1–30.
    #[serde(default = "default_rfcomm_channel")]
    pub channel: u8,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

/// Listener timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    /// Longest single accept wait; bounds shutdown latency.
    #[serde(default = "default_accept_ms")]
    pub accept_ms: u64,
    /// Wait for the first byte on a new connection.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// Wait for more bytes once a message has started.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause after an accept error.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

/// Board geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_per_column")]
    pub per_column: usize,
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
    /// Visible orders per board half.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Payload decoding policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    /// Accept payloads missing `active_orders` or `completed_orders`,
    /// treating the missing list as empty.
    #[serde(default)]
    pub lenient_missing_lists: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_active_title() -> String {
    BoardLabels::default().active
}
fn default_completed_title() -> String {
    BoardLabels::default().completed
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_backlog() -> u32 {
    1
}
fn default_rfcomm_channel() -> u8 {
    DEFAULT_RFCOMM_CHANNEL
}
fn default_accept_ms() -> u64 {
    1000
}
fn default_idle_ms() -> u64 {
    5000
}
fn default_settle_ms() -> u64 {
    250
}
fn default_error_backoff_ms() -> u64 {
    1000
}
fn default_per_column() -> usize {
    orderboard_core::domain::layout::DEFAULT_PER_COLUMN
}
fn default_max_columns() -> usize {
    orderboard_core::domain::layout::DEFAULT_MAX_COLUMNS
}
fn default_capacity() -> usize {
    orderboard_core::domain::layout::DEFAULT_CAPACITY
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            active_title: default_active_title(),
            completed_title: default_completed_title(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            port: default_tcp_port(),
            backlog: default_backlog(),
        }
    }
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            channel: default_rfcomm_channel(),
            backlog: default_backlog(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            accept_ms: default_accept_ms(),
            idle_ms: default_idle_ms(),
            settle_ms: default_settle_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            per_column: default_per_column(),
            max_columns: default_max_columns(),
            capacity: default_capacity(),
        }
    }
}

// ── Derived runtime settings ──────────────────────────────────────────────────

impl NetworkConfig {
    /// The address to bind, or `None` if `bind_address` is not an IP address.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_address
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl AppConfig {
    /// Checks every value that would otherwise fail later at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] or [`ConfigError::Layout`] naming the
    /// first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.enabled && self.network.socket_addr().is_none() {
            return Err(ConfigError::Invalid {
                key: "network.bind_address",
                reason: format!("{:?} is not an IP address", self.network.bind_address),
            });
        }
        if self.wireless.enabled && !(1..=MAX_RFCOMM_CHANNEL).contains(&self.wireless.channel) {
            return Err(ConfigError::Invalid {
                key: "wireless.channel",
                reason: format!("must be between 1 and {MAX_RFCOMM_CHANNEL}"),
            });
        }
        for (key, value) in [
            ("timeouts.accept_ms", self.timeouts.accept_ms),
            ("timeouts.idle_ms", self.timeouts.idle_ms),
            ("timeouts.settle_ms", self.timeouts.settle_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        self.layout_policy()?;
        Ok(())
    }

    /// The layout policy described by the `[layout]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Layout`] if any geometry value is zero.
    pub fn layout_policy(&self) -> Result<LayoutPolicy, ConfigError> {
        Ok(LayoutPolicy::new(
            self.layout.per_column,
            self.layout.max_columns,
            self.layout.capacity,
        )?)
    }

    /// Timeouts and decode policy for the listeners.
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            timeouts: ListenerTimeouts {
                accept: Duration::from_millis(self.timeouts.accept_ms),
                idle: Duration::from_millis(self.timeouts.idle_ms),
                settle: Duration::from_millis(self.timeouts.settle_ms),
                error_backoff: Duration::from_millis(self.timeouts.error_backoff_ms),
            },
            decode: DecodeOptions {
                lenient_missing_lists: self.protocol.lenient_missing_lists,
            },
        }
    }

    /// Board headings.
    pub fn labels(&self) -> BoardLabels {
        BoardLabels {
            active: self.display.active_title.clone(),
            completed: self.display.completed_title.clone(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the default location, returning defaults if the
/// directory cannot be determined or the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    match config_file_path() {
        Ok(path) => load_config_from(&path),
        Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
        Err(e) => Err(e),
    }
}

/// Loads the config from `path`, returning defaults if it does not exist.
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

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
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

/// Resolves the platform config directory for the order board.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("OrderBoard"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("OrderBoard")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("orderboard"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Configuration settings for the coordinator and the initiator.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HeartbeatError;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub security: SecurityConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    /// Only required by `heartbeat-client`.
    pub initiator: Option<InitiatorConfig>,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Path to the shared HMAC secret file.
    pub hmac_secret_path: PathBuf,
    /// Session timeout and freshness window, in seconds. Must lie in
    /// `1..=MAX_SESSION_TIMEOUT_SECONDS`.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,
}

/// Coordinator HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Request path of the beat endpoint.
    #[serde(default = "default_path")]
    pub path: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// External programs run on session connect/disconnect.
#[derive(Debug, Clone, Deserialize)]
pub struct HooksConfig {
    pub on_connect: Option<PathBuf>,
    pub on_disconnect: Option<PathBuf>,
    /// Hooks still running after this many seconds are killed.
    #[serde(default = "default_hook_timeout")]
    pub timeout_seconds: u64,
}

/// What the initiator does when its very first round fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapPolicy {
    /// Stop beating for good and report the failure.
    #[default]
    Stop,
    /// Wait one interval and bootstrap again, until cancelled.
    Retry,
}

/// Initiator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatorConfig {
    /// Full URL of the coordinator's beat endpoint.
    pub coordinator_url: String,
    /// Identifier this initiator beats for.
    pub identifier: String,
    /// Seconds between beats. Must be below the coordinator's timeout.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub bootstrap_failure: BootstrapPolicy,
}

// Default value functions
/// Upper bound for `session_timeout_seconds` (one day).
pub const MAX_SESSION_TIMEOUT_SECONDS: u64 = 86_400;

fn default_session_timeout() -> u64 {
    15
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7878))
}

fn default_path() -> String {
    "/heartbeat".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_hook_timeout() -> u64 {
    10
}

fn default_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            path: default_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            on_connect: None,
            on_disconnect: None,
            timeout_seconds: default_hook_timeout(),
        }
    }
}

impl SecurityConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }
}

impl HooksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl InitiatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HeartbeatError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| HeartbeatError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            HeartbeatError::Config { message } => HeartbeatError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, HeartbeatError> {
        let settings: Settings = toml::from_str(content).map_err(|e| HeartbeatError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// The `[initiator]` section, required by the client binary.
    pub fn initiator(&self) -> Result<&InitiatorConfig, HeartbeatError> {
        self.initiator.as_ref().ok_or_else(|| HeartbeatError::Config {
            message: "Missing [initiator] section".to_string(),
        })
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), HeartbeatError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(HeartbeatError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(HeartbeatError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        // Bounded so session deadlines and the freshness window stay
        // representable.
        if !(1..=MAX_SESSION_TIMEOUT_SECONDS).contains(&self.security.session_timeout_seconds) {
            return Err(HeartbeatError::Config {
                message: format!(
                    "session_timeout_seconds must be between 1 and {}",
                    MAX_SESSION_TIMEOUT_SECONDS
                ),
            });
        }

        if !self.coordinator.path.starts_with('/') {
            return Err(HeartbeatError::Config {
                message: format!(
                    "Invalid coordinator path '{}'. Must start with '/'",
                    self.coordinator.path
                ),
            });
        }

        if let Some(initiator) = &self.initiator {
            if initiator.identifier.is_empty() {
                return Err(HeartbeatError::Config {
                    message: "initiator identifier must not be empty".to_string(),
                });
            }
            if initiator.interval_seconds == 0 {
                return Err(HeartbeatError::Config {
                    message: "interval_seconds must be greater than zero".to_string(),
                });
            }
            if !initiator.coordinator_url.starts_with("http://")
                && !initiator.coordinator_url.starts_with("https://")
            {
                return Err(HeartbeatError::Config {
                    message: format!(
                        "Invalid coordinator_url '{}'. Must be an http(s) URL",
                        initiator.coordinator_url
                    ),
                });
            }
        }

        Ok(())
    }
}

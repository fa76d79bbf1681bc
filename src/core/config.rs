/*!
 * Configuration
 *
 * Tunables for process launching and raw sockets. Defaults mirror the
 * classic values (backlog 5, 1 KiB reads); every field can be overridden
 * through `PROCNET_*` environment variables.
 */

use crate::core::types::{DEFAULT_BACKLOG, DEFAULT_DETACHED_LOG, DEFAULT_READ_BUFFER_SIZE};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_BACKLOG: &str = "PROCNET_BACKLOG";
pub const ENV_READ_BUFFER: &str = "PROCNET_READ_BUFFER";
pub const ENV_DETACHED_LOG: &str = "PROCNET_DETACHED_LOG";
pub const ENV_DETACHED_DELAY_MS: &str = "PROCNET_DETACHED_DELAY_MS";
pub const ENV_INHERIT_OUTPUT: &str = "PROCNET_INHERIT_OUTPUT";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    #[diagnostic(
        code(config::invalid_value),
        help("Unset the variable to fall back to the default.")
    )]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Socket tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SocketConfig {
    /// Pending-connection queue depth passed to listen(2) (default: 5)
    pub backlog: i32,
    /// Capacity of a single read(2) (default: 1024)
    pub read_buffer_size: usize,
}

impl SocketConfig {
    pub fn new() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    #[must_use]
    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Process launching tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessConfig {
    /// File receiving detached-process completion records
    pub detached_log_path: PathBuf,
    /// Pause between a detached child's exit and its completion record
    pub detached_record_delay: Duration,
    /// Children inherit stdout/stderr instead of writing to /dev/null
    pub inherit_output: bool,
}

impl ProcessConfig {
    pub fn new() -> Self {
        Self {
            detached_log_path: PathBuf::from(DEFAULT_DETACHED_LOG),
            detached_record_delay: Duration::ZERO,
            inherit_output: false,
        }
    }

    #[must_use]
    pub fn with_detached_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.detached_log_path = path.into();
        self
    }

    #[must_use]
    pub fn with_detached_record_delay(mut self, delay: Duration) -> Self {
        self.detached_record_delay = delay;
        self
    }

    #[must_use]
    pub fn with_inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub process: ProcessConfig,
    pub socket: SocketConfig,
}

impl Config {
    /// Load configuration from `PROCNET_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_BACKLOG) {
            let backlog = parse_number::<i32>(ENV_BACKLOG, &value)?;
            if backlog <= 0 {
                return Err(invalid(ENV_BACKLOG, value, "must be positive"));
            }
            config.socket.backlog = backlog;
        }

        if let Some(value) = lookup(ENV_READ_BUFFER) {
            let size = parse_number::<usize>(ENV_READ_BUFFER, &value)?;
            if size == 0 {
                return Err(invalid(ENV_READ_BUFFER, value, "must be non-zero"));
            }
            config.socket.read_buffer_size = size;
        }

        if let Some(value) = lookup(ENV_DETACHED_LOG) {
            if value.trim().is_empty() {
                return Err(invalid(ENV_DETACHED_LOG, value, "must not be empty"));
            }
            config.process.detached_log_path = PathBuf::from(value);
        }

        if let Some(value) = lookup(ENV_DETACHED_DELAY_MS) {
            let millis = parse_number::<u64>(ENV_DETACHED_DELAY_MS, &value)?;
            config.process.detached_record_delay = Duration::from_millis(millis);
        }

        if let Some(value) = lookup(ENV_INHERIT_OUTPUT) {
            config.process.inherit_output = match value.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(invalid(
                        ENV_INHERIT_OUTPUT,
                        value.clone(),
                        "expected 1/0/true/false",
                    ))
                }
            };
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| invalid(key, value.to_string(), "not a number"))
}

fn invalid(key: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue { key, value, reason }
}

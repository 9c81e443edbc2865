//! Configuration errors and semantic validation.

use crate::agent::AgentConfig;
use std::path::PathBuf;
use thiserror::Error;

/// Config result type.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Smallest accepted request buffer limit.
pub const MIN_MESSAGE_BYTES: usize = 64;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::NotFound { .. } => 50,
            ConfigError::Io { .. } => 51,
            ConfigError::Parse { .. } => 52,
            ConfigError::Invalid { .. } => 53,
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate an agent configuration semantically. Reports the first problem.
pub fn validate_config(config: &AgentConfig) -> ConfigResult<()> {
    let listener = &config.listener;
    if listener.address.trim().is_empty() {
        return Err(ConfigError::invalid("listener.address", "must not be empty"));
    }
    if listener.port == 0 {
        return Err(ConfigError::invalid("listener.port", "must be in 1..=65535"));
    }
    if listener.max_connections == 0 {
        return Err(ConfigError::invalid(
            "listener.max_connections",
            "must be at least 1",
        ));
    }
    if listener.max_message_bytes < MIN_MESSAGE_BYTES {
        return Err(ConfigError::invalid(
            "listener.max_message_bytes",
            format!(
                "must be at least {MIN_MESSAGE_BYTES}, got {}",
                listener.max_message_bytes
            ),
        ));
    }

    let supervisor = &config.supervisor;
    let nonzero = [
        ("supervisor.capacity", supervisor.capacity as u64),
        ("supervisor.restart_counter", u64::from(supervisor.restart_counter)),
        ("supervisor.start_attempts", u64::from(supervisor.start_attempts)),
        ("supervisor.poll_interval_ms", supervisor.poll_interval_ms),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            return Err(ConfigError::invalid(field, "must be at least 1"));
        }
    }
    if supervisor.proc_root.as_os_str().is_empty() {
        return Err(ConfigError::invalid("supervisor.proc_root", "must not be empty"));
    }

    Ok(())
}

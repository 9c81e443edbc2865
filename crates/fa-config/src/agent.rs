//! `agent.toml` schema.
//!
//! # Example
//!
//! ```toml
//! [listener]
//! address = "0.0.0.0"
//! port = 12345
//! max_connections = 10
//!
//! [supervisor]
//! capacity = 32
//! restart_counter = 3
//! restart_delay_ms = 1000
//! proc_alive_timeout_ms = 10000
//! ```
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use crate::validate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default agent port.
pub const DEFAULT_PORT: u16 = 12345;

/// Default number of concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default limit for one buffered request (1 MB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default number of targets one monitor supervises.
pub const DEFAULT_CAPACITY: usize = 32;

/// Full agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub listener: ListenerConfig,
    pub supervisor: SupervisorConfig,
}

/// TCP command listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address.
    pub address: String,
    pub port: u16,
    /// Connections served at once; extra ones are closed on accept.
    pub max_connections: usize,
    /// Largest request the framer buffers before discarding it.
    pub max_message_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Target supervision settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum registered targets per monitor.
    pub capacity: usize,
    /// Spawn attempts per launch.
    pub restart_counter: u32,
    /// Pause between failed spawn attempts.
    pub restart_delay_ms: u64,
    /// Full launch cycles per target during start.
    pub start_attempts: u32,
    /// Delay before the post-launch liveness probe.
    pub proc_alive_timeout_ms: u64,
    /// Sleep between wait rounds when no child changed state.
    pub poll_interval_ms: u64,
    /// How long a stopped loop keeps draining pending reaps and detaches.
    pub shutdown_grace_ms: u64,
    /// Process filesystem root.
    pub proc_root: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            restart_counter: 3,
            restart_delay_ms: 1000,
            start_attempts: 3,
            proc_alive_timeout_ms: 10_000,
            poll_interval_ms: 100,
            shutdown_grace_ms: 2000,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl SupervisorConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn proc_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.proc_alive_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.port.is_none() && self.max_connections.is_none()
    }
}

impl AgentConfig {
    /// Parse from TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(content: &str, origin: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "<root>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply CLI overrides in place.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(address) = &overrides.address {
            self.listener.address = address.clone();
        }
        if let Some(port) = overrides.port {
            self.listener.port = port;
        }
        if let Some(max) = overrides.max_connections {
            self.listener.max_connections = max;
        }
    }
}

//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG path →
//! system path → built-in defaults.

use crate::agent::AgentConfig;
use crate::validate::{validate_config, ConfigResult};
use crate::CONFIG_FILENAME;
use std::path::{Path, PathBuf};

/// Where the configuration was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/fa-agent/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Resolved config file location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Path to agent.toml (or None when defaults apply).
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// A validated configuration together with its origin.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AgentConfig,
    pub resolved: ResolvedPath,
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "FA_AGENT_CONFIG";
pub const ENV_CONFIG_DIR: &str = "FA_AGENT_CONFIG_DIR";

/// Application name for XDG and system directories.
const APP_NAME: &str = "fa-agent";

/// Resolve the config file path.
///
/// 1. Explicit CLI path (used even if missing, so loading reports it)
/// 2. `FA_AGENT_CONFIG`
/// 3. `FA_AGENT_CONFIG_DIR` + `agent.toml`
/// 4. XDG config directory (`~/.config/fa-agent/`)
/// 5. System config (`/etc/fa-agent/`)
/// 6. Built-in defaults (None)
pub fn resolve_config_path(cli_path: Option<&Path>) -> ResolvedPath {
    if let Some(path) = cli_path {
        return ResolvedPath {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        return found(system_path, ConfigSource::SystemConfig);
    }

    ResolvedPath::default()
}

fn found(path: PathBuf, source: ConfigSource) -> ResolvedPath {
    ResolvedPath {
        path: Some(path),
        source,
    }
}

/// Resolve, read, and validate the agent configuration.
pub fn load_config(cli_path: Option<&Path>) -> ConfigResult<LoadedConfig> {
    let resolved = resolve_config_path(cli_path);
    let config = match &resolved.path {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    validate_config(&config)?;
    Ok(LoadedConfig { config, resolved })
}

/// Get the XDG config directory for the agent.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

impl LoadedConfig {
    /// Human-readable origin, for `config --check`.
    pub fn describe_origin(&self) -> String {
        match &self.resolved.path {
            Some(path) => format!("{} ({})", path.display(), self.resolved.source),
            None => self.resolved.source.to_string(),
        }
    }
}

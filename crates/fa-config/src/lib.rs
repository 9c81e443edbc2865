//! Fuzzing agent configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for `agent.toml` (listener and supervisor sections)
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation

pub mod agent;
pub mod resolve;
pub mod validate;

pub use agent::{AgentConfig, ConfigOverrides, ListenerConfig, SupervisorConfig};
pub use resolve::{load_config, resolve_config_path, ConfigSource, LoadedConfig, ResolvedPath};
pub use validate::{validate_config, ConfigError, ConfigResult};

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "agent.toml";

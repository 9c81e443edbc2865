//! Config resolution order and file loading against real files.
//!
//! Covers:
//! - CLI > FA_AGENT_CONFIG > FA_AGENT_CONFIG_DIR > XDG
//! - Validation failures surfaced by load_config

use fa_config::resolve::{load_config, resolve_config_path, ConfigSource};
use fa_config::{ConfigError, CONFIG_FILENAME};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: &[&str] = &["FA_AGENT_CONFIG", "FA_AGENT_CONFIG_DIR", "XDG_CONFIG_HOME"];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|k| (k.to_string(), env::var(k).ok()))
            .collect();
        for key in keys {
            env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f()
}

fn write_config(dir: &Path, port: u16) -> std::path::PathBuf {
    fs::create_dir_all(dir).expect("create config dir");
    let path = dir.join(CONFIG_FILENAME);
    fs::write(&path, format!("[listener]\nport = {port}\n")).expect("write config");
    path
}

#[test]
fn test_cli_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        let cli = write_config(&tmp.path().join("cli"), 1001);
        let envp = write_config(&tmp.path().join("env"), 1002);
        env::set_var("FA_AGENT_CONFIG", &envp);

        let loaded = load_config(Some(&cli)).unwrap();
        assert_eq!(loaded.resolved.source, ConfigSource::CliArgument);
        assert_eq!(loaded.config.listener.port, 1001);
    });
}

#[test]
fn test_env_path_over_env_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        let envp = write_config(&tmp.path().join("env"), 1002);
        let dir = tmp.path().join("dir");
        write_config(&dir, 1003);
        env::set_var("FA_AGENT_CONFIG", &envp);
        env::set_var("FA_AGENT_CONFIG_DIR", &dir);

        let loaded = load_config(None).unwrap();
        assert_eq!(loaded.resolved.source, ConfigSource::Environment);
        assert_eq!(loaded.config.listener.port, 1002);
    });
}

#[test]
fn test_env_dir_over_xdg() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("dir");
        write_config(&dir, 1003);
        let xdg = tmp.path().join("xdg");
        write_config(&xdg.join("fa-agent"), 1004);
        env::set_var("FA_AGENT_CONFIG_DIR", &dir);
        env::set_var("XDG_CONFIG_HOME", &xdg);

        let loaded = load_config(None).unwrap();
        assert_eq!(loaded.config.listener.port, 1003);
    });
}

#[test]
fn test_xdg_config_found() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        let xdg = tmp.path().join("xdg");
        let path = write_config(&xdg.join("fa-agent"), 1004);
        env::set_var("XDG_CONFIG_HOME", &xdg);

        let resolved = resolve_config_path(None);
        assert_eq!(resolved.source, ConfigSource::XdgConfig);
        assert_eq!(resolved.path.as_deref(), Some(path.as_path()));
    });
}

#[test]
fn test_missing_env_path_falls_through() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        env::set_var("FA_AGENT_CONFIG", tmp.path().join("absent.toml"));
        let dir = tmp.path().join("dir");
        write_config(&dir, 1005);
        env::set_var("FA_AGENT_CONFIG_DIR", &dir);

        let loaded = load_config(None).unwrap();
        assert_eq!(loaded.config.listener.port, 1005);
    });
}

#[test]
fn test_invalid_file_rejected() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");
        fs::write(&path, "[supervisor]\ncapacity = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "supervisor.capacity"));
    });
}

#[test]
fn test_syntax_error_rejected() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    });
}

//! Fuzz target for agent.toml parsing and validation.
//!
//! Tests that TOML configuration parsing handles arbitrary input without
//! panicking.

#![no_main]

use fa_config::{validate_config, AgentConfig};
use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = AgentConfig::from_toml_str(text, Path::new("fuzz.toml")) {
        let _ = validate_config(&config);
    }
});

//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use tts_core::ServerConfig;

pub mod info;
pub mod normalize;
pub mod synth;
pub mod voices;

/// Configuration from `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

pub mod schema;

pub use schema::{ClientConfig, DEFAULT_TOOL_MODELS};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "CABLYAI_API_KEY";

/// Default config directory (~/.cablyai).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".cablyai"))
        .unwrap_or_else(|| PathBuf::from(".cablyai"))
}

/// Default config file path (~/.cablyai/config.toml).
pub fn default_config_path() -> PathBuf {
    default_home_dir().join("config.toml")
}

/// Expand a leading `~` in a user-supplied path. Environment variables are
/// left as written.
pub fn resolve_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load config from the given path, or return defaults.
///
/// `CABLYAI_API_KEY` takes precedence over the file's `api_key`.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents).context("Failed to parse config (TOML)")?
    } else {
        ClientConfig::default()
    };

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.is_empty() {
            config.api_key = key;
        }
    }

    Ok(config)
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &ClientConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

//! Runtime configuration loaded from `~/.config/streamgate/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Browser-like user agent sent to every platform.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Settings shared by the extractors and the download orchestration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Extra attempts for session creation on HTTP 500/503/404.
    pub extractor_retries: u32,
    /// Quality requested from the live relay when a format doesn't pin one.
    pub live_quality: String,
    /// Wait before reconnecting the live control channel after a failure.
    pub reconnect_delay_secs: u64,
    pub user_agent: String,
    /// Raw `Cookie` header value seeded into the shared cookie jar.
    pub cookies: Option<String>,
    /// ffmpeg binary; looked up in `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extractor_retries: 3,
            live_quality: "high".to_string(),
            reconnect_delay_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookies: None,
            ffmpeg_path: None,
        }
    }
}

impl Config {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Load the configuration from the default location.
///
/// Returns defaults if the file doesn't exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load the configuration from an explicit path, falling back to defaults
/// when the file is missing.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamgate")
        .join("config.toml")
}

//! Spectra configuration file handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spectra_replay::{ClockConfig, LoaderConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in a directory.
pub const CONFIG_FILE: &str = "spectra.toml";

/// Top-level Spectra configuration (spectra.toml)
#[derive(Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SpectraConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Session API
#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL; sessions are read from `{base_url}/api/sessions/{id}/replay`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Local session files
#[derive(Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SessionsConfig {
    /// Directory of `<id>.json` payloads tried before the API
    #[serde(default)]
    pub bundled_dir: Option<PathBuf>,
}

/// Transport behaviour
#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_seek_step_ms")]
    pub seek_step_ms: u64,
    #[serde(default = "default_speed")]
    pub default_speed: f64,
    /// Speeds the player accepts; empty accepts any positive speed
    #[serde(default = "default_speeds")]
    pub speeds: Vec<f64>,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_seek_step_ms() -> u64 {
    5_000
}

fn default_speed() -> f64 {
    1.0
}

fn default_speeds() -> Vec<f64> {
    vec![0.5, 1.0, 2.0, 4.0]
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            seek_step_ms: default_seek_step_ms(),
            default_speed: default_speed(),
            speeds: default_speeds(),
        }
    }
}

impl SpectraConfig {
    /// Load configuration from a directory (looks for spectra.toml).
    ///
    /// A missing file yields the defaults.
    pub fn load_from_dir(path: &Path) -> Result<Self> {
        let config_path = if path.is_file() {
            path.to_path_buf()
        } else {
            path.join(CONFIG_FILE)
        };

        if !config_path.exists() {
            tracing::debug!("No {} found, using defaults", config_path.display());
            return Ok(Self::default());
        }

        Self::load_file(&config_path)
    }

    /// Load an explicitly named configuration file, which must exist.
    pub fn load_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: SpectraConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.playback.poll_interval_ms == 0 {
            anyhow::bail!("playback.poll_interval_ms must be positive");
        }
        if !(self.playback.default_speed.is_finite() && self.playback.default_speed > 0.0) {
            anyhow::bail!("playback.default_speed must be a positive number");
        }
        if let Some(speed) = self
            .playback
            .speeds
            .iter()
            .find(|s| !(s.is_finite() && **s > 0.0))
        {
            anyhow::bail!("playback.speeds contains invalid speed {speed}");
        }
        crate::commands::check_speed(self.playback.default_speed, &self.playback.speeds)
            .context("playback.default_speed must be one of playback.speeds")?;
        Ok(())
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            base_url: self.server.base_url.clone(),
            bundled_dir: self.sessions.bundled_dir.clone(),
            timeout: Duration::from_secs(self.server.timeout_secs),
        }
    }

    pub fn clock_config(&self) -> ClockConfig {
        ClockConfig::default()
            .with_poll_interval(Duration::from_millis(self.playback.poll_interval_ms))
            .with_seek_step(Duration::from_millis(self.playback.seek_step_ms))
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

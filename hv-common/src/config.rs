//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `HV_CONFIG` environment variable
//! 3. Per-user config file (`<config dir>/hv/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: a warning is logged and the
//! compiled defaults are used. A config file that exists but does not parse
//! or validate is an error.

use crate::fade_curves::FadeCurve;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HV_CONFIG";

/// Session configuration loaded from TOML
///
/// Every field has a compiled default, so an empty file is a valid config.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket endpoint of the session server
    pub server_url: String,

    /// Sample rate of PCM sent upstream (Hz)
    pub input_sample_rate: u32,

    /// Sample rate of the local output timeline (Hz)
    pub output_sample_rate: u32,

    /// Crossfade window between adjacent segments (ms)
    pub fade_window_ms: u64,

    /// Gain curve used for segment fades ("linear", "cosine", "equal_power")
    pub fade_curve: String,

    /// How far the cursor may sit ahead of the clock and still count as settled (ms)
    pub settle_grace_ms: u64,

    /// Interval between settle checks (ms)
    pub settle_poll_ms: u64,

    /// Upper bound on a single settle wait before forcing the transition (ms)
    pub settle_timeout_ms: u64,

    /// Length of the turn-completion silence frame (ms)
    pub silence_frame_ms: u64,

    /// Delay between `thinking: false` and hiding the indicator (ms)
    pub thinking_linger_ms: u64,

    /// Frames rendered per output block
    pub render_block_frames: usize,

    /// Frames per captured microphone block
    pub capture_block_frames: usize,

    /// Event bus capacity per subscriber
    pub event_bus_capacity: usize,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8765/ws".to_string(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            fade_window_ms: 50,
            fade_curve: "linear".to_string(),
            settle_grace_ms: 500,
            settle_poll_ms: 200,
            settle_timeout_ms: 30_000,
            silence_frame_ms: 500,
            thinking_linger_ms: 300,
            render_block_frames: 480,
            capture_block_frames: 320,
            event_bus_capacity: 256,
            logging: LoggingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config following the resolution priority
    ///
    /// `cli_path` is the `--config` argument, if any.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let Some(path) = ConfigResolver::new().resolve(cli_path) else {
            info!("No config file found, using compiled defaults");
            return Ok(Self::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                info!("Loading config from {}", path.display());
                Self::from_toml_str(&text)
            }
            Err(e) => {
                warn!(
                    "Config file {} unreadable ({}), using compiled defaults",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }
        if self.settle_poll_ms == 0 {
            return Err(Error::Config("settle_poll_ms must be non-zero".to_string()));
        }
        if self.render_block_frames == 0 || self.capture_block_frames == 0 {
            return Err(Error::Config("block sizes must be non-zero".to_string()));
        }
        if FadeCurve::parse(&self.fade_curve).is_none() {
            return Err(Error::Config(format!(
                "unknown fade_curve '{}'",
                self.fade_curve
            )));
        }
        Ok(())
    }

    /// Parsed fade curve (falls back to linear if validation was skipped)
    pub fn fade_curve(&self) -> FadeCurve {
        FadeCurve::parse(&self.fade_curve).unwrap_or_default()
    }

    pub fn fade_window(&self) -> Duration {
        Duration::from_millis(self.fade_window_ms)
    }

    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }

    pub fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn thinking_linger(&self) -> Duration {
        Duration::from_millis(self.thinking_linger_ms)
    }

    /// Number of samples in the turn-completion silence frame
    pub fn silence_frame_samples(&self) -> usize {
        (self.input_sample_rate as u64 * self.silence_frame_ms / 1000) as usize
    }
}

/// Resolves which config file (if any) should be read
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    env_var: String,
    user_config: Option<PathBuf>,
}

impl ConfigResolver {
    /// Resolver using `HV_CONFIG` and the platform config directory
    pub fn new() -> Self {
        Self {
            env_var: CONFIG_ENV_VAR.to_string(),
            user_config: default_config_path(),
        }
    }

    /// Override the per-user config location (used by tests)
    pub fn with_user_config(mut self, path: Option<PathBuf>) -> Self {
        self.user_config = path;
        self
    }

    /// Pick the config file path, highest priority first
    pub fn resolve(&self, cli_path: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Per-user config file, only if present
        self.user_config.clone().filter(|p| p.exists())
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform per-user config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hv").join("config.toml"))
}

//! TOML config file support.
//!
//! Config location: `~/.config/replterm/config.toml`, or the file named by
//! `REPLTERM_CONFIG`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{input, scrollback, streams};

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV_VAR: &str = "REPLTERM_CONFIG";

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Period of the output drain, in milliseconds.
    pub tick_interval_ms: u64,
    /// Trailing characters of committed text kept in the terminal.
    pub scrollback_chars: usize,
    /// Input lines buffered before the oldest is dropped.
    pub input_queue_capacity: usize,
    /// Enabled language ids in display order. Empty enables every language
    /// the runtime supports.
    pub languages: Vec<String>,
    /// Language selected at startup.
    pub default_language: Option<String>,
    /// Print the startup banner.
    pub banner: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: streams::TICK_INTERVAL.as_millis() as u64,
            scrollback_chars: scrollback::DEFAULT_CHARS,
            input_queue_capacity: input::QUEUE_CAPACITY,
            languages: Vec::new(),
            default_language: None,
            banner: true,
        }
    }
}

impl Config {
    /// Aggregator tick period, clamped to the supported range.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
            .clamp(streams::MIN_TICK_INTERVAL, streams::MAX_TICK_INTERVAL)
    }

    /// Committed-text window, clamped to the supported range.
    pub fn scrollback_chars(&self) -> usize {
        self.scrollback_chars
            .clamp(scrollback::MIN_CHARS, scrollback::MAX_CHARS)
    }

    /// Input queue capacity, clamped to `1..=MAX_QUEUE_CAPACITY`.
    pub fn input_queue_capacity(&self) -> usize {
        self.input_queue_capacity
            .clamp(1, input::MAX_QUEUE_CAPACITY)
    }

    /// Whether `language` is enabled by this config.
    pub fn language_enabled(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language)
    }
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# replterm configuration

# How often program output is copied into the terminal (milliseconds)
tick-interval-ms = 100

# Characters of output kept on screen; older text is dropped
scrollback-chars = 1000

# Input lines buffered for a program that has not asked for them yet
input-queue-capacity = 8

# Enabled languages, in the order the language switch cycles through them.
# Leave empty to enable every language the runtime provides.
# languages = ["js", "python", "ruby", "R"]

# Language selected at startup
# default-language = "python"

# Print the startup banner
banner = true
"#;

/// Return the config file path, honouring `REPLTERM_CONFIG`.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => replterm_paths::config_file(),
    }
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> anyhow::Result<PathBuf> {
    use anyhow::Context;

    let path = config_path();
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write default config: {:?}", path))?;
        tracing::info!("Created default config at {:?}", path);
    }
    Ok(path)
}

/// Load and parse the config file. Returns default on any error.
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load and parse a specific config file. Returns default on any error.
pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > crate::constants::settings::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    match toml::from_str(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Failed to parse config.toml: {}", e);
            Config::default()
        }
    }
}

//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for confab
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Answer surface base URL (the percent-encoded query is appended)
    pub base_url: Option<String>,
    /// Fetcher kind: "browser" (default) or "http"
    pub fetcher: Option<String>,
    /// Run the browser headless
    pub headless: Option<bool>,
    /// User agent presented to the surface
    pub user_agent: Option<String>,
    /// Maximum retries per turn after the initial attempt
    pub max_retries: Option<u32>,
    /// Base retry delay in seconds (linear backoff)
    pub retry_delay_secs: Option<u64>,
    /// Probability threshold for treating a query as a follow-up
    pub follow_up_threshold: Option<f64>,
    /// Start in short-answer mode
    pub short: Option<bool>,
    /// Seconds to wait for a page to finish rendering
    pub readiness_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("confab")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for CONFAB_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("CONFAB_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            fetcher: Some("browser".to_string()),
            headless: Some(true),
            max_retries: Some(2),
            retry_delay_secs: Some(3),
            follow_up_threshold: Some(0.5),
            short: Some(false),
            ..Config::default()
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# confab configuration file
# Place at ~/.config/confab/config.toml (Linux/Mac) or %APPDATA%\confab\config.toml (Windows)

# Answer surface base URL; the percent-encoded query is appended
# base_url = "https://www.google.com/search?udm=50&aep=11&q="

# Fetcher kind: "browser" drives headless Chromium, "http" does plain GETs
fetcher = "browser"

# Run the browser headless (set false to watch it work)
headless = true

# User agent presented to the surface (optional)
# user_agent = "Mozilla/5.0 ..."

# Retries per turn after the initial attempt
max_retries = 2

# Base retry delay in seconds; attempt n waits (n + 1) * retry_delay_secs
retry_delay_secs = 3

# Probability a relevance verdict must clear to reuse conversation context
follow_up_threshold = 0.5

# Start in short-answer mode
short = false

# Seconds to wait for a page to finish rendering
# readiness_timeout_secs = 15
"#
}

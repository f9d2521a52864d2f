//! Server configuration.
//!
//! Values come from, in increasing priority: built-in defaults, the JSON file
//! at `<config dir>/summit/config.json`, and `SUMMIT_*` environment variables.
//! Command-line flags override all of them in `main`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "summit";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub host: String,
    pub port: u16,
    /// SQLite file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Quiet period before a changed document is written.
    pub debounce_ms: u64,
    /// Unused sessions are written back and dropped after this long.
    pub session_idle_secs: u64,
    /// Chat endpoint of the local inference server.
    pub inference_url: String,
    pub inference_model: String,
    pub inference_timeout_secs: u64,
    /// Most tasks a single generation may add.
    pub max_generated_tasks: usize,
    /// Tasks requested when the client does not say.
    pub default_generated_tasks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 17020,
            database_path: None,
            debounce_ms: 800,
            session_idle_secs: 1800,
            inference_url: "http://localhost:11434/api/chat".to_string(),
            inference_model: "llama3.2".to_string(),
            inference_timeout_secs: 60,
            max_generated_tasks: 10,
            default_generated_tasks: 5,
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment.
    /// Falls back to defaults if the file is missing or fails to parse.
    pub fn load() -> Self {
        let mut config = match config_path() {
            Ok(path) => Self::load_file(&path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Overlay values from `SUMMIT_*` variables looked up through `var`.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("SUMMIT_HOST") {
            self.host = host;
        }
        parse_into(&var, "SUMMIT_PORT", &mut self.port);
        if let Some(path) = var("SUMMIT_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        parse_into(&var, "SUMMIT_DEBOUNCE_MS", &mut self.debounce_ms);
        parse_into(&var, "SUMMIT_SESSION_IDLE_SECS", &mut self.session_idle_secs);
        if let Some(url) = var("SUMMIT_INFERENCE_URL") {
            self.inference_url = url;
        }
        if let Some(model) = var("SUMMIT_INFERENCE_MODEL") {
            self.inference_model = model;
        }
        parse_into(&var, "SUMMIT_INFERENCE_TIMEOUT_SECS", &mut self.inference_timeout_secs);
        parse_into(&var, "SUMMIT_MAX_GENERATED_TASKS", &mut self.max_generated_tasks);
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Number of tasks to generate for a requested count.
    pub fn generation_count(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_generated_tasks)
            .clamp(1, self.max_generated_tasks.max(1))
    }
}

fn parse_into<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = var(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}

fn config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join(APP_NAME).join(CONFIG_FILE))
}

//! Configuration loading for the monitor daemon.
//!
//! Resolution order for the config file:
//! 1. `SEATABLE_MONITOR_CONFIG` environment variable
//! 2. `./config.toml`
//! 3. `~/.config/seatable-monitor/config.toml`
//!
//! `SEATABLE_API_TOKEN` overrides the configured token. A missing or
//! malformed configuration is fatal at startup; nothing here degrades.

use crate::error::{MonitorError, Result};
use fs_err as fs;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "SEATABLE_MONITOR_CONFIG";
const TOKEN_ENV_VAR: &str = "SEATABLE_API_TOKEN";
const CONFIG_RELATIVE_PATH: &str = ".config/seatable-monitor/config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub seatable: SeatableSection,
    pub monitor: MonitorSection,
    pub tmux: TmuxSection,
    pub claude: ClaudeSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeatableSection {
    pub server_url: String,
    pub api_token: String,
    pub table_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Overrides the detected hostname when non-empty.
    pub hostname: String,
    pub poll_interval_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            poll_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmuxSection {
    /// Session-name prefixes to collect. Empty disables tmux collection.
    pub session_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClaudeSection {
    pub enabled: bool,
    pub lookback_hours: f64,
    pub todos_dir: String,
    pub tasks_dir: String,
    pub projects_dir: String,
    pub tail_lines: usize,
}

impl Default for ClaudeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_hours: 5.0,
            todos_dir: "~/.claude/todos".to_string(),
            tasks_dir: "~/.claude/tasks".to_string(),
            projects_dir: "~/.claude/projects".to_string(),
            tail_lines: 30,
        }
    }
}

impl MonitorConfig {
    /// Parses a config from TOML text and validates the required fields.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        let mut config: MonitorConfig =
            toml::from_str(content).map_err(|err| MonitorError::ConfigMalformed {
                path: origin.to_path_buf(),
                details: err.to_string(),
            })?;

        if let Ok(token) = env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                config.seatable.api_token = token;
            }
        }
        if config.seatable.table_name.trim().is_empty() {
            config.seatable.table_name = "Task Monitor".to_string();
        }

        if config.seatable.server_url.trim().is_empty() {
            return Err(MonitorError::ConfigIncomplete(
                "seatable.server_url is required".to_string(),
            ));
        }
        if config.seatable.api_token.trim().is_empty() {
            return Err(MonitorError::ConfigIncomplete(format!(
                "seatable.api_token is required (or set {})",
                TOKEN_ENV_VAR
            )));
        }

        Ok(config)
    }
}

/// Resolves the config file path without reading it.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let local = PathBuf::from("config.toml");
    if local.exists() {
        return Ok(local);
    }
    let home = dirs::home_dir().ok_or(MonitorError::HomeDirNotFound)?;
    Ok(home.join(CONFIG_RELATIVE_PATH))
}

/// Loads and validates the monitor configuration.
pub fn load_config() -> Result<MonitorConfig> {
    let path = config_path()?;
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(MonitorError::ConfigNotFound(path));
        }
        Err(err) => {
            return Err(MonitorError::Io {
                context: format!("reading config {}", path.display()),
                source: err,
            });
        }
    };
    MonitorConfig::from_toml(&content, &path)
}

/// Expands a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Backend systems keyed by destination id
    #[serde(default)]
    pub destinations: HashMap<String, DestinationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Listen on all interfaces so clients inside WSL2 can reach the bridge
    #[serde(default)]
    pub allow_lan_access: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allow_lan_access: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_file")]
    pub file: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            file: default_workspace_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Connection data for one ABAP backend system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Base URL of the system, e.g. https://host:44300
    pub url: String,

    #[serde(default)]
    pub client: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// When false, mutating calls never get a stateful enqueue session
    #[serde(default = "default_enqueue_sessions")]
    pub enqueue_sessions: bool,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Config {
    pub fn bind_address(&self) -> &str {
        if self.server.allow_lan_access {
            "0.0.0.0"
        } else {
            &self.server.host
        }
    }
}

// Default value functions
fn default_port() -> u16 { 19456 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_request_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_enqueue_sessions() -> bool { true }

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("adt-bridge")
}

fn default_workspace_file() -> PathBuf {
    config_dir().join("workspace.toml")
}

/// Get default config file path
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load config from file, or return defaults if not found.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path() (usually ~/.config/adt-bridge/config.toml)
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(config_path) = path {
        if config_path.exists() {
            let config = read_config(&config_path)?;
            tracing::info!("Loaded config from specified path {:?}", config_path);
            return Ok(config);
        } else {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
    }

    let local_config = PathBuf::from("config.toml");
    if local_config.exists() {
        match read_config(&local_config) {
            Ok(config) => {
                tracing::info!("Loaded config from current directory {:?}", local_config);
                return Ok(config);
            }
            Err(e) => {
                tracing::error!("Failed to load ./config.toml: {}. Falling back to default path.", e);
            }
        }
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let config = read_config(&default_path)?;
        tracing::info!("Loaded config from default path {:?}", default_path);
        Ok(config)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

fn read_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.workspace.file = expand_path(&config.workspace.file);
    Ok(config)
}

/// Expand ~ in path to home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
    }
    path.to_path_buf()
}

//! Application configuration
//!
//! Layering, low to high priority: built-in defaults, an optional TOML
//! file, environment variables, CLI flags, each folded over the last.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_BUCKET_CAPACITY, DEFAULT_BUCKET_REFILL_PER_SEC,
    DEFAULT_CHAT_HISTORY_LEN, DEFAULT_CHAT_MESSAGE_MAX_CHARS, DEFAULT_CHAT_WINDOW_MAX,
    DEFAULT_CHAT_WINDOW_SECS, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HOST,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_MINIMUM_REQUESTS,
    DEFAULT_MONITORING_WINDOW_SECS, DEFAULT_PORT, DEFAULT_RECOVERY_TIMEOUT_SECS,
    DEFAULT_REQUEST_DEADLINE_SECS, DEFAULT_REQUEST_LIMIT, DEFAULT_SESSION_TTL_DAYS,
    ENV_HOST, ENV_PORT, SHUTDOWN_GRACE_SECS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_payload_bytes: usize,
    pub idle_timeout_secs: u64,
    pub request_deadline_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            request_deadline_secs: DEFAULT_REQUEST_DEADLINE_SECS,
            shutdown_grace_secs: SHUTDOWN_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub session_ttl_days: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub bucket_capacity: u32,
    pub bucket_refill_per_sec: f64,
    pub chat_window_max: u32,
    pub chat_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            bucket_refill_per_sec: DEFAULT_BUCKET_REFILL_PER_SEC,
            chat_window_max: DEFAULT_CHAT_WINDOW_MAX,
            chat_window_secs: DEFAULT_CHAT_WINDOW_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub chat_history_len: usize,
    pub chat_message_max_chars: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            chat_history_len: DEFAULT_CHAT_HISTORY_LEN,
            chat_message_max_chars: DEFAULT_CHAT_MESSAGE_MAX_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfigDefaults {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub request_limit: u32,
    pub monitoring_window_secs: u64,
    pub minimum_requests: u32,
}

impl Default for BreakerConfigDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
            request_limit: DEFAULT_REQUEST_LIMIT,
            monitoring_window_secs: DEFAULT_MONITORING_WINDOW_SECS,
            minimum_requests: DEFAULT_MINIMUM_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub rooms: RoomsConfig,
    pub breaker: BreakerConfigDefaults,
    pub debug: bool,
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration, applying file → env → CLI overrides in that order.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let mut config = if let Some(path) = Self::resolve_config_path(cli) {
            Self::from_file(&path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(host) = std::env::var(ENV_HOST) {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            config.server.port = port
                .parse()
                .with_context(|| format!("Invalid {} value: {}", ENV_PORT, port))?;
        }

        if let Some(host) = &cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(dir) = &cli.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if cli.debug {
            config.debug = true;
        }
        if cli.no_auth {
            config.auth.enabled = false;
        }

        Ok(config)
    }

    fn resolve_config_path(cli: &CliConfig) -> Option<PathBuf> {
        if let Some(path) = &cli.config {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var(super::constants::ENV_CONFIG) {
            return Some(PathBuf::from(path));
        }
        let default = PathBuf::from(CONFIG_FILE_NAME);
        if default.exists() { Some(default) } else { None }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_default_breaker_config() {
        let config = BreakerConfigDefaults::default();
        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(config.minimum_requests, DEFAULT_MINIMUM_REQUESTS);
    }

    #[test]
    fn test_cli_overrides_apply() {
        let cli = CliConfig {
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            config: None,
            data_dir: None,
            debug: true,
            no_auth: true,
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert!(config.debug);
        assert!(!config.auth.enabled);
    }
}

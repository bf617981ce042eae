//! # Configuration Module
//!
//! Process settings for the control plane: where the admin API listens, which
//! adapter holds the declarative documents, how reloads are paced, which
//! providers this process hosts and how it logs.
//!
//! Settings come from a YAML file with environment variable overrides on
//! top. A missing file means all defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::config_error;
use crate::core::error::{GatewayError, GatewayResult};

/// Settings file read when `GATEWAY_CONFIG_PATH` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub admin: AdminConfig,

    pub loader: LoaderConfig,

    /// Providers hosted by this process
    pub providers: Vec<String>,

    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            loader: LoaderConfig::default(),
            providers: default_providers(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Path named by `GATEWAY_CONFIG_PATH`, else the default
    pub fn config_path() -> PathBuf {
        std::env::var("GATEWAY_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load settings from a YAML file, falling back to defaults when it does
    /// not exist, then apply environment overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let mut config = Self::read_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a settings file as written, without overrides
    pub async fn read_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Environment variables override file settings
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        use std::env;

        if let Ok(port) = env::var("GATEWAY_ADMIN_PORT") {
            self.admin.port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_ADMIN_PORT: {}", e)))?;
        }

        if let Ok(addr) = env::var("GATEWAY_ADMIN_BIND_ADDRESS") {
            self.admin.bind_address = addr;
        }

        if let Ok(dir) = env::var("GATEWAY_CONFIG_DIR") {
            self.loader.adapter = AdapterConfig::File {
                path: PathBuf::from(dir),
            };
        }

        if let Ok(url) = env::var("GATEWAY_REMOTE_URL") {
            let base_url = Url::parse(&url)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_REMOTE_URL: {}", e)))?;
            self.loader.adapter = match &self.loader.adapter {
                AdapterConfig::Remote {
                    poll_interval,
                    timeout,
                    ..
                } => AdapterConfig::Remote {
                    base_url,
                    poll_interval: *poll_interval,
                    timeout: *timeout,
                },
                AdapterConfig::File { .. } => AdapterConfig::Remote {
                    base_url,
                    poll_interval: default_poll_interval(),
                    timeout: default_remote_timeout(),
                },
            };
        }

        if let Ok(ms) = env::var("GATEWAY_DEBOUNCE_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_DEBOUNCE_MS: {}", e)))?;
            self.loader.debounce = Duration::from_millis(ms);
        }

        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("GATEWAY_LOG_FORMAT") {
            self.logging.format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(config_error!(
                        "Invalid GATEWAY_LOG_FORMAT: expected json or pretty, got '{}'",
                        other
                    ))
                }
            };
        }

        Ok(())
    }

    /// Collects every problem into one error
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.admin.port == 0 {
            errors.push("admin.port must be greater than 0".to_string());
        }
        if self.admin.bind_address.trim().is_empty() {
            errors.push("admin.bind_address cannot be empty".to_string());
        }

        match &self.loader.adapter {
            AdapterConfig::File { path } => {
                if path.as_os_str().is_empty() {
                    errors.push("loader.adapter.path cannot be empty".to_string());
                }
            }
            AdapterConfig::Remote {
                base_url,
                poll_interval,
                timeout,
            } => {
                if !matches!(base_url.scheme(), "http" | "https") {
                    errors.push(format!("loader.adapter.base_url must be http(s), got {}", base_url));
                }
                if poll_interval.is_zero() {
                    errors.push("loader.adapter.poll_interval must be greater than 0".to_string());
                }
                if timeout.is_zero() {
                    errors.push("loader.adapter.timeout must be greater than 0".to_string());
                }
            }
        }

        if self.loader.debounce.is_zero() {
            errors.push("loader.debounce must be greater than 0".to_string());
        }
        if self.loader.watch_retry.is_zero() {
            errors.push("loader.watch_retry must be greater than 0".to_string());
        }

        if self.providers.iter().any(|p| p.trim().is_empty()) {
            errors.push("providers cannot contain empty names".to_string());
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(format!(
                "Configuration validation failed: {}",
                errors.join("; ")
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub bind_address: String,
    pub port: u16,
}

impl AdminConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4122,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub adapter: AdapterConfig,

    /// Quiet period before a burst of changes is reloaded
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,

    /// Pause before a failed watch is restarted
    #[serde(with = "humantime_serde")]
    pub watch_retry: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterConfig::default(),
            debounce: Duration::from_millis(500),
            watch_retry: Duration::from_secs(2),
        }
    }
}

/// Where declarative documents are stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterConfig {
    /// A directory of YAML files
    File { path: PathBuf },

    /// Another gateway's admin API
    Remote {
        base_url: Url,
        #[serde(with = "humantime_serde", default = "default_poll_interval")]
        poll_interval: Duration,
        #[serde(with = "humantime_serde", default = "default_remote_timeout")]
        timeout: Duration,
    },
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig::File {
            path: PathBuf::from("config/resources"),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_remote_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

pub fn default_providers() -> Vec<String> {
    ["graphql", "rpc", "pubsub", "tasks"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

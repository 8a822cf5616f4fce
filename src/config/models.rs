// src/config/models.rs
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one backend must be configured")]
    EmptyBackendList,

    #[error("backend {0} uses unsupported scheme (expected http or https)")]
    UnsupportedScheme(String),

    #[error("backend {0} has no host")]
    MissingHost(String),

    #[error("backend {0} is listed more than once")]
    DuplicateBackend(String),

    #[error("health_check.{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: Url,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Tcp,
}

/// Active probing is opt-in. With `enabled: false` nothing changes
/// backend liveness after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_probe_kind")]
    pub kind: ProbeKind,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_probe_kind() -> ProbeKind {
    ProbeKind::Http
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: default_probe_kind(),
            path: default_health_path(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::EmptyBackendList);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            let url = &backend.url;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::UnsupportedScheme(url.to_string()));
            }
            if url.host_str().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingHost(url.to_string()));
            }
            if !seen.insert(url.as_str()) {
                return Err(ConfigError::DuplicateBackend(url.to_string()));
            }
        }

        if self.health_check.enabled {
            if self.health_check.interval_secs == 0 {
                return Err(ConfigError::ZeroDuration("interval_secs"));
            }
            if self.health_check.timeout_secs == 0 {
                return Err(ConfigError::ZeroDuration("timeout_secs"));
            }
        }

        Ok(())
    }
}

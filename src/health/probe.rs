// src/health/probe.rs
use crate::config::{HealthCheckConfig, ProbeKind};
use crate::proxy::Backend;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Host;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("invalid probe target: {0}")]
    InvalidTarget(String),
}

/// A single liveness check against one backend.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeError>;

    fn name(&self) -> &'static str;
}

pub fn create_probe(config: &HealthCheckConfig) -> anyhow::Result<Arc<dyn HealthProbe>> {
    Ok(match config.kind {
        ProbeKind::Http => Arc::new(HttpProbe::new(config.path.clone(), config.timeout())?),
        ProbeKind::Tcp => Arc::new(TcpProbe::new(config.timeout())),
    })
}

/// GET `<backend>/<path>`; any 2xx counts as alive.
pub struct HttpProbe {
    client: Client,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(path: String, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            path,
            timeout,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeError> {
        let url = backend
            .url()
            .join(&self.path)
            .map_err(|e| ProbeError::InvalidTarget(e.to_string()))?;

        let response = timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Plain TCP connect to the backend's host and port.
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeError> {
        let url = backend.url();
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(ProbeError::InvalidTarget(url.to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::InvalidTarget(url.to_string()))?;

        timeout(self.timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

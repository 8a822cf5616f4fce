// src/health/checker.rs
use super::probe::HealthProbe;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, ServerPool};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Periodically probes every backend and writes the outcome to its
/// liveness flag. This is the only component that toggles liveness.
pub struct HealthChecker {
    interval: Duration,
    pool: Arc<ServerPool>,
    probe: Arc<dyn HealthProbe>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthChecker {
    pub fn new(
        interval: Duration,
        pool: Arc<ServerPool>,
        probe: Arc<dyn HealthProbe>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            interval,
            pool,
            probe,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting {} health checker with interval: {:?}",
            self.probe.name(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().check_all_backends().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn check_all_backends(self: Arc<Self>) -> Vec<HealthCheckResult> {
        let tasks: Vec<_> = self
            .pool
            .backends()
            .iter()
            .cloned()
            .map(|backend| {
                let checker = self.clone();
                tokio::spawn(async move { checker.check_backend(&backend).await })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Health check task failed: {}", e),
            }
        }

        let healthy_count = results.iter().filter(|r| r.healthy).count();
        if let Some(metrics) = &self.metrics {
            metrics.observe_pool(&self.pool);
        }

        debug!(
            "Health check complete: {} healthy, {} unhealthy",
            healthy_count,
            results.len() - healthy_count
        );
        results
    }

    async fn check_backend(&self, backend: &Backend) -> HealthCheckResult {
        let start = Instant::now();
        let was_healthy = backend.is_healthy();

        let outcome = self.probe.probe(backend).await;
        let response_time_ms = start.elapsed().as_millis() as u64;
        let healthy = outcome.is_ok();

        backend.set_healthy(healthy);

        match (&outcome, was_healthy) {
            (Ok(()), false) => info!("Backend {} is healthy again", backend.url()),
            (Err(e), true) => warn!("Backend {} is now unhealthy: {}", backend.url(), e),
            _ => {}
        }

        HealthCheckResult {
            backend: backend.url().to_string(),
            healthy,
            response_time_ms,
            error: outcome.err().map(|e| e.to_string()),
            checked_at: Utc::now(),
        }
    }
}

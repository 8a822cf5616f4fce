// src/metrics/collector.rs
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use crate::proxy::ServerPool;
use std::sync::Arc;
use std::time::Instant;
use anyhow::Result;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub no_backend_total: IntCounter,

    // Backend metrics
    pub backend_health_status: IntGaugeVec,
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Total number of requests"),
            &["backend", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let no_backend_total = IntCounter::new(
            "lb_no_backend_total",
            "Requests rejected because no backend was healthy",
        )?;
        registry.register(Box::new(no_backend_total.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend liveness (1 = healthy, 0 = unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let healthy_backends = IntGauge::new("lb_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Number of registered backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            no_backend_total,
            backend_health_status,
            healthy_backends,
            total_backends,
        })
    }

    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    pub fn record_request(&self, backend: &str, status_code: u16, timer: RequestTimer) {
        self.requests_total
            .with_label_values(&[backend, &status_code.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[backend])
            .observe(timer.start.elapsed().as_secs_f64());
    }

    pub fn record_no_backend(&self) {
        self.no_backend_total.inc();
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        self.backend_health_status
            .with_label_values(&[backend])
            .set(healthy as i64);
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }

    /// Snapshot every backend's liveness and the pool totals.
    pub fn observe_pool(&self, pool: &ServerPool) {
        for backend in pool.backends() {
            self.update_backend_health(backend.url().as_str(), backend.is_healthy());
        }
        self.update_backend_counts(pool.healthy_count(), pool.len());
    }
}

pub struct RequestTimer {
    start: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_recorded_values() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        let timer = metrics.start_timer();
        metrics.record_request("http://a:1/", 200, timer);
        metrics.record_no_backend();
        metrics.update_backend_health("http://a:1/", true);
        metrics.update_backend_counts(1, 2);

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains(r#"lb_requests_total{backend="http://a:1/",status_code="200"} 1"#));
        assert!(text.contains("lb_no_backend_total 1"));
        assert!(text.contains("lb_healthy_backends 1"));
        assert!(text.contains("lb_total_backends 2"));
    }

    #[test]
    fn observing_pool_seeds_every_backend() {
        let mut pool = ServerPool::new();
        for port in [3031, 3032] {
            let url = url::Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
            pool.register(crate::proxy::Backend::new(url));
        }
        pool.backends()[1].set_healthy(false);

        let registry = MetricsRegistry::new().unwrap();
        registry.collector().observe_pool(&pool);

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains(r#"lb_backend_health_status{backend="http://127.0.0.1:3031/"} 1"#));
        assert!(text.contains(r#"lb_backend_health_status{backend="http://127.0.0.1:3032/"} 0"#));
        assert!(text.contains("lb_healthy_backends 1"));
        assert!(text.contains("lb_total_backends 2"));
    }
}

// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;
use tracing::Instrument;

use crate::metrics::MetricsCollector;
use crate::proxy::{ProxyError, ServerPool};
use crate::server::builder::PeerService;

/// Catch-all request entry point: pick the next healthy backend and relay
/// the request to it, or answer 503 when there is none.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<ServerPool>,
    metrics: Option<Arc<MetricsCollector>>,
    client_addr: Option<SocketAddr>,
}

impl Dispatcher {
    pub fn new(pool: Arc<ServerPool>) -> Self {
        Self {
            pool,
            metrics: None,
            client_addr: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        let timer = self.metrics.as_ref().map(|m| m.start_timer());

        let Some(backend) = self.pool.select_next() else {
            tracing::warn!(method = %req.method(), path = %req.uri().path(), "no backends available");
            if let Some(metrics) = &self.metrics {
                metrics.record_no_backend();
            }
            return ProxyError::NoHealthyBackends.into();
        };

        tracing::info!("{} {} -> {}", req.method(), req.uri().path(), backend.url());
        let response = backend.proxy(req, self.client_addr).await;

        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            metrics.record_request(backend.url().as_str(), response.status().as_u16(), timer);
        }
        response
    }
}

impl PeerService for Dispatcher {
    fn for_peer(&self, peer: SocketAddr) -> Self {
        Self {
            client_addr: Some(peer),
            ..self.clone()
        }
    }
}

impl Service<Request<Body>> for Dispatcher {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let dispatcher = self.clone();
        let span = tracing::info_span!("request", id = %uuid::Uuid::new_v4());
        Box::pin(async move { Ok(dispatcher.dispatch(req).await) }.instrument(span))
    }
}

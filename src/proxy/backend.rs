// src/proxy/backend.rs
use super::proxy::ReverseProxy;
use hyper::{Body, Request, Response};
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use url::Url;

/// One upstream target. The URL and proxy are fixed at construction; only
/// the liveness flag changes, under a lock private to this backend.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    alive: RwLock<bool>,
    proxy: ReverseProxy,
}

impl Backend {
    /// New backends start out healthy.
    pub fn new(url: Url) -> Self {
        Self {
            proxy: ReverseProxy::new(url.clone()),
            url,
            alive: RwLock::new(true),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_healthy(&self, healthy: bool) {
        // A poisoned lock still guards a valid bool.
        let mut alive = self.alive.write().unwrap_or_else(PoisonError::into_inner);
        *alive = healthy;
    }

    pub fn is_healthy(&self) -> bool {
        *self.alive.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forward through this backend's proxy. The outcome never feeds back
    /// into liveness.
    pub async fn proxy(&self, req: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        self.proxy.forward(req, client_addr).await
    }
}

// ────────────────────────────────
// src/proxy/proxy.rs
// Single-target HTTP forwarding used by each backend
// ────────────────────────────────

use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST, UPGRADE};
use hyper::upgrade::OnUpgrade;
use hyper::{Body, Client, Request, Response, StatusCode, Uri, Version};
use hyper_tls::HttpsConnector;
use std::net::SocketAddr;
use url::{Position, Url};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

// Headers that apply to a single transport hop and must not be relayed.
// Upgrade is put back explicitly for upgrade handshakes.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to one fixed upstream. Built once per backend and
/// reused for every request; the inner client keeps its own connections.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    target: Url,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl ReverseProxy {
    pub fn new(target: Url) -> Self {
        let client = Client::builder().build::<_, Body>(HttpsConnector::new());
        Self { target, client }
    }

    /// Relay `req` to the target and hand back its response. Transport
    /// failures become a 502; nothing is retried.
    pub async fn forward(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Response<Body> {
        match self.try_forward(req, client_addr).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(target_url = %self.target, %err, "upstream request failed");
                err.into()
            }
        }
    }

    async fn try_forward(
        &self,
        mut req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let upgrade = upgrade_type(req.headers());
        let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut req));
        let (mut parts, body) = req.into_parts();

        parts.uri = self.rewrite_uri(&parts.uri)?;
        // The upstream client speaks HTTP/1.1 regardless of the inbound version.
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        if let Some(protocol) = &upgrade {
            restore_upgrade(&mut parts.headers, protocol.clone());
        }
        // Let the client derive Host from the target authority.
        parts.headers.remove(HOST);
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr);
        }

        let mut response = self
            .client
            .request(Request::from_parts(parts, body))
            .await?;

        let backend_protocol = upgrade_type(response.headers());
        strip_hop_by_hop(response.headers_mut());

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let (Some(client_upgrade), Some(protocol)) =
                (client_upgrade, backend_protocol.or(upgrade))
            {
                restore_upgrade(response.headers_mut(), protocol);
                let backend_upgrade = hyper::upgrade::on(&mut response);
                tokio::spawn(tunnel(client_upgrade, backend_upgrade, self.target.clone()));
            }
        }

        Ok(response)
    }

    fn rewrite_uri(&self, incoming: &Uri) -> Result<Uri, ProxyError> {
        let path = join_path(self.target.path(), incoming.path());
        let query = match (self.target.query(), incoming.query()) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => format!("?{}&{}", a, b),
            (Some(a), _) if !a.is_empty() => format!("?{}", a),
            (_, Some(b)) if !b.is_empty() => format!("?{}", b),
            _ => String::new(),
        };

        let authority = &self.target[Position::BeforeHost..Position::AfterPort];
        format!("{}://{}{}{}", self.target.scheme(), authority, path, query)
            .parse::<Uri>()
            .map_err(|e| ProxyError::InvalidUri(e.to_string()))
    }
}

/// Copy bytes both ways once client and backend have both switched protocols.
async fn tunnel(client: OnUpgrade, backend: OnUpgrade, target: Url) {
    match tokio::try_join!(client, backend) {
        Ok((mut client_io, mut backend_io)) => {
            match tokio::io::copy_bidirectional(&mut client_io, &mut backend_io).await {
                Ok((sent, received)) => {
                    tracing::debug!(target_url = %target, sent, received, "upgraded connection closed")
                }
                Err(err) => {
                    tracing::debug!(target_url = %target, %err, "upgraded connection ended with error")
                }
            }
        }
        Err(err) => tracing::warn!(target_url = %target, %err, "protocol upgrade failed"),
    }
}

/// Join two path segments with exactly one slash between them.
fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
}

/// The requested protocol when the headers carry `Connection: upgrade`.
fn upgrade_type(headers: &HeaderMap) -> Option<HeaderValue> {
    if connection_tokens(headers).any(|token| token.eq_ignore_ascii_case("upgrade")) {
        headers.get(UPGRADE).cloned()
    } else {
        None
    }
}

fn restore_upgrade(headers: &mut HeaderMap, protocol: HeaderValue) {
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, protocol);
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection may name additional per-hop headers.
    let listed: Vec<HeaderName> = connection_tokens(headers)
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .collect();
    let value = if prior.is_empty() {
        ip
    } else {
        format!("{}, {}", prior.join(", "), ip)
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Upstream error: {0}")]
    Upstream(#[from] hyper::Error),

    #[error("Invalid upstream URI: {0}")]
    InvalidUri(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_) | ProxyError::InvalidUri(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match err {
            ProxyError::NoHealthyBackends => "no backends available",
            ProxyError::Upstream(_) | ProxyError::InvalidUri(_) => "bad gateway",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status();
        response
    }
}

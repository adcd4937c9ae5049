//! Upstream addressing and the forwarding HTTP client.
//!
//! # Responsibilities
//! - Resolve the upstream HTTP and WebSocket base URLs from config
//! - Map an inbound path and query onto the upstream base
//! - Issue one HTTP call per forwarded request, bounded by a timeout
//!
//! # Design Decisions
//! - No retries: a failed forward is reported to the client as-is
//! - Bodies are buffered (JSON-RPC payloads are small and must be inspected)

use axum::body::{Body, Bytes};
use axum::http::{header, uri::PathAndQuery, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::error::{BridgeError, BridgeResult};

/// Upstream base URLs for both transports.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    http: Url,
    ws: Url,
}

impl UpstreamTarget {
    pub fn from_config(config: &UpstreamConfig) -> BridgeResult<Self> {
        let http = parse_url(&config.url)?;
        let ws = match &config.ws_url {
            Some(ws_url) => parse_url(ws_url)?,
            None => derive_ws_url(&http)?,
        };
        Ok(Self { http, ws })
    }

    pub fn http_base(&self) -> &Url {
        &self.http
    }

    pub fn ws_base(&self) -> &Url {
        &self.ws
    }

    /// Upstream HTTP URI for an inbound path and query.
    pub fn http_uri(&self, path_and_query: Option<&PathAndQuery>) -> BridgeResult<Uri> {
        join(&self.http, path_and_query)
            .as_str()
            .parse::<Uri>()
            .map_err(|e| BridgeError::InvalidUpstream(e.to_string()))
    }

    /// Upstream WebSocket URL for an inbound path and query.
    pub fn ws_url(&self, path_and_query: Option<&PathAndQuery>) -> String {
        join(&self.ws, path_and_query).into()
    }
}

fn parse_url(value: &str) -> BridgeResult<Url> {
    Url::parse(value).map_err(|e| BridgeError::InvalidUpstream(format!("{}: {}", value, e)))
}

fn derive_ws_url(http: &Url) -> BridgeResult<Url> {
    let scheme = match http.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(BridgeError::InvalidUpstream(format!(
                "cannot derive a WebSocket URL from scheme '{}'",
                other
            )))
        }
    };
    let mut ws = http.clone();
    ws.set_scheme(scheme)
        .map_err(|_| BridgeError::InvalidUpstream(format!("cannot switch {} to {}", http, scheme)))?;
    Ok(ws)
}

/// Append the inbound path to the base path; the inbound query wins over the base query.
fn join(base: &Url, path_and_query: Option<&PathAndQuery>) -> Url {
    let mut url = base.clone();
    let Some(pq) = path_and_query else {
        return url;
    };

    let path = pq.path();
    if !path.is_empty() && path != "/" {
        let joined = format!("{}{}", base.path().trim_end_matches('/'), path);
        url.set_path(&joined);
    }
    if let Some(query) = pq.query() {
        url.set_query(Some(query));
    }
    url
}

/// Buffered upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// HTTP client used by the HTTP bridge.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            timeout,
            max_body_bytes,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            config.max_body_bytes,
        )
    }

    /// Send one request with the given method, URI and body. Only the
    /// content negotiation headers of `headers` are carried over.
    pub async fn send(
        &self,
        method: Method,
        uri: Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> BridgeResult<UpstreamResponse> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(accept) = headers.get(header::ACCEPT) {
            builder = builder.header(header::ACCEPT, accept.clone());
        }
        let request = builder
            .body(Body::from(body))
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let exchange = async {
            let response: hyper::Response<hyper::body::Incoming> = self
                .client
                .request(request)
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;

            let (parts, incoming) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(incoming), self.max_body_bytes)
                .await
                .map_err(|e| BridgeError::BodyRead(e.to_string()))?;

            Ok(UpstreamResponse {
                status: parts.status,
                content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                body,
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(self.timeout)),
        }
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("timeout", &self.timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

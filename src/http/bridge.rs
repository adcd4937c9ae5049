//! HTTP bridge: one JSON-RPC request in, one behavior out.
//!
//! # Data Flow
//! ```text
//! POST body → Envelope (method) → BehaviorSelector
//!     Forward   → pre-delay → upstream → post-delay → relay status + body
//!     Fail      → 500 { "error": "Internal error - Proxy Denied" }
//!     NotAnswer → 200 headers, body never completes (until shutdown)
//! ```
//!
//! # Design Decisions
//! - Upstream is never contacted for Fail and NotAnswer
//! - A hung response costs one idle future; no task or thread is parked
//! - Hung responses end with an aborted body on shutdown so the server can drain

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::io;
use std::sync::Arc;

use crate::chaos::{BehaviorKind, BehaviorSelector, DelayController};
use crate::http::error::BridgeError;
use crate::http::jsonrpc::{error_body, Envelope, PROXY_DENIED_MESSAGE};
use crate::http::upstream::{UpstreamClient, UpstreamTarget};
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionKind, ConnectionTracker};
use crate::observability::metrics::{self, Transport};

#[derive(Clone)]
pub struct HttpBridge {
    selector: Arc<BehaviorSelector>,
    delays: Arc<DelayController>,
    target: Arc<UpstreamTarget>,
    client: UpstreamClient,
    tracker: ConnectionTracker,
    shutdown: ShutdownSignal,
    max_body_bytes: usize,
}

impl HttpBridge {
    pub fn new(
        selector: Arc<BehaviorSelector>,
        delays: Arc<DelayController>,
        target: Arc<UpstreamTarget>,
        client: UpstreamClient,
        tracker: ConnectionTracker,
        shutdown: ShutdownSignal,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            selector,
            delays,
            target,
            client,
            tracker,
            shutdown,
            max_body_bytes,
        }
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = BridgeError::BodyRead(e.to_string());
                tracing::warn!(request_id = %request_id, error = %err, "Rejecting request");
                return json_error(StatusCode::BAD_REQUEST, err.to_string());
            }
        };

        let Some(envelope) = Envelope::parse(&body) else {
            tracing::warn!(request_id = %request_id, "Request body is not JSON");
            return json_error(StatusCode::BAD_REQUEST, "request body is not valid JSON");
        };
        let method = envelope.method_name();
        let behavior = self.selector.select_behavior(method);
        metrics::record_behavior(Transport::Http, behavior);

        match behavior {
            BehaviorKind::Fail => {
                tracing::info!(request_id = %request_id, method = %method, "Failing request");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, PROXY_DENIED_MESSAGE)
            }
            BehaviorKind::NotAnswer => {
                tracing::info!(request_id = %request_id, method = %method, "Leaving request unanswered");
                self.hang()
            }
            BehaviorKind::Forward => self.forward(parts, body, &request_id, method).await,
        }
    }

    /// 200 with headers sent and a body that stays open until shutdown or
    /// until the client goes away.
    fn hang(&self) -> Response {
        let guard = self.tracker.track(ConnectionKind::HungResponse);
        let shutdown = self.shutdown.clone();
        let body = futures_util::stream::once(async move {
            shutdown.recv().await;
            drop(guard);
            Err::<Bytes, io::Error>(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "proxy shutting down",
            ))
        });

        let mut response = Response::new(Body::from_stream(body));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    async fn forward(&self, parts: Parts, body: Bytes, request_id: &str, method: &str) -> Response {
        self.delays.apply_pre().await;

        let uri = match self.target.http_uri(parts.uri.path_and_query()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Cannot build upstream URI");
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };

        tracing::debug!(request_id = %request_id, method = %method, upstream = %uri, "Forwarding request");
        match self.client.send(parts.method, uri, &parts.headers, body).await {
            Ok(upstream) => {
                self.delays.apply_post().await;
                let content_type = upstream
                    .content_type
                    .unwrap_or_else(|| HeaderValue::from_static("application/json"));
                let mut response = Response::new(Body::from(upstream.body));
                *response.status_mut() = upstream.status;
                response.headers_mut().insert(header::CONTENT_TYPE, content_type);
                response
            }
            Err(e) => {
                metrics::record_upstream_error(Transport::Http);
                tracing::warn!(request_id = %request_id, method = %method, error = %e, "Upstream request failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(error_body(message))).into_response()
}

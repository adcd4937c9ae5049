//! Proxy router.
//!
//! # Responsibilities
//! - Accept any method on any path
//! - Dispatch WebSocket upgrades to the WebSocket bridge, everything else to the HTTP bridge
//! - Wire up middleware (request ID, tracing)

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts, State},
    http::{header, HeaderMap, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::bridge::HttpBridge;
use crate::http::websocket::WebSocketBridge;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub http: HttpBridge,
    pub websocket: WebSocketBridge,
}

/// Build the proxy router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(proxy_entry))
        .route("/{*path}", any(proxy_entry))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn proxy_entry(State(state): State<AppState>, request: Request<Body>) -> Response {
    if !is_websocket_upgrade(request.headers()) {
        return state.http.handle(request).await;
    }

    let path_and_query = request.uri().path_and_query().cloned();
    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => state.websocket.accept(upgrade, path_and_query),
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Rejected WebSocket upgrade");
            rejection.into_response()
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

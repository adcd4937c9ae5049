//! Shared utilities for integration tests: a mock JSON-RPC node and proxy setup.
#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rpc_chaos_proxy::{ChaosProxy, ProxyConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Call counters of the mock node.
#[derive(Clone, Default)]
pub struct Counters {
    pub http_calls: Arc<AtomicUsize>,
    pub ws_frames: Arc<AtomicUsize>,
    pub ws_open: Arc<AtomicUsize>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub counters: Counters,
}

impl MockUpstream {
    pub fn http_calls(&self) -> usize {
        self.counters.http_calls.load(Ordering::SeqCst)
    }

    pub fn ws_frames(&self) -> usize {
        self.counters.ws_frames.load(Ordering::SeqCst)
    }

    pub fn ws_open(&self) -> usize {
        self.counters.ws_open.load(Ordering::SeqCst)
    }
}

/// Start a mock JSON-RPC node on an ephemeral port.
///
/// HTTP (any path): replies `{id, result: {method, params, path, query}}`;
/// method `upstream_error` gets a 502.
/// WebSocket at `/ws`: same echo per text frame; method `close_me` closes the
/// socket and method `no_reply` is swallowed.
pub async fn start_mock_upstream() -> MockUpstream {
    let counters = Counters::default();
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/", post(http_handler))
        .route("/{*path}", post(http_handler))
        .with_state(counters.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, counters }
}

fn echo_result(request: &Value, path: &str, query: Option<&str>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": {
            "method": request["method"],
            "params": request["params"],
            "path": path,
            "query": query,
        },
    })
}

async fn http_handler(State(counters): State<Counters>, uri: Uri, body: Bytes) -> Response {
    counters.http_calls.fetch_add(1, Ordering::SeqCst);
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    if request["method"] == "upstream_error" {
        return (StatusCode::BAD_GATEWAY, Json(json!({ "error": "node unavailable" }))).into_response();
    }
    Json(echo_result(&request, uri.path(), uri.query())).into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(counters): State<Counters>) -> Response {
    ws.on_upgrade(move |socket| ws_echo(socket, counters))
}

async fn ws_echo(mut socket: WebSocket, counters: Counters) {
    counters.ws_open.fetch_add(1, Ordering::SeqCst);
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                counters.ws_frames.fetch_add(1, Ordering::SeqCst);
                let request: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                if request["method"] == "close_me" {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                if request["method"] == "no_reply" {
                    continue;
                }
                let reply = echo_result(&request, "/ws", None).to_string();
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    counters.ws_open.fetch_sub(1, Ordering::SeqCst);
}

pub fn proxy_config(upstream: &MockUpstream) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.admin.bind_address = "127.0.0.1:0".into();
    config.upstream.url = format!("http://{}", upstream.addr);
    config.upstream.ws_url = Some(format!("ws://{}/ws", upstream.addr));
    config.upstream.request_timeout_secs = 5;
    config
}

/// Start a proxy in front of `upstream`. Returns the proxy and its address.
pub async fn start_proxy(upstream: &MockUpstream) -> (ChaosProxy, SocketAddr) {
    start_proxy_with(proxy_config(upstream)).await
}

pub async fn start_proxy_with(config: ProxyConfig) -> (ChaosProxy, SocketAddr) {
    let mut proxy = ChaosProxy::new(config).unwrap();
    let addr = proxy.start().await.unwrap();
    (proxy, addr)
}

pub fn rpc(id: u64, method: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": [] })
}

/// Poll `check` until it holds or `deadline` passes.
pub async fn eventually(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

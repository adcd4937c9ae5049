//! WebSocket bridge.
//!
//! # Responsibilities
//! - Accept the client upgrade and open one upstream socket per client
//! - Apply a behavior to every client frame
//! - Correlate upstream responses with forwarded requests and trace latency
//! - Tear both sockets down when either one closes
//!
//! # Data Flow
//! ```text
//! Client ──frame──→ select behavior
//!                     NotAnswer → dropped
//!                     Fail      → error frame back to client
//!                     Forward   → pending table → pre-delay → wait upstream → Upstream
//! Upstream ──frame──→ pending lookup (latency) → post-delay → wait client → Client
//! ```
//!
//! # Design Decisions
//! - Each socket has a dedicated writer task fed by a channel, so frames
//!   keep their order and a slow delay never blocks the other direction
//! - Frames are relayed verbatim; only `id` and `method` are inspected
//! - The upstream connect starts right away; frames sent before it is open
//!   wait on the readiness link for a bounded time, then are dropped

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::uri::PathAndQuery,
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as UpstreamMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::Instrument;

use crate::chaos::{BehaviorKind, BehaviorSelector, DelayController};
use crate::config::WebSocketConfig;
use crate::http::error::Peer;
use crate::http::jsonrpc::{proxy_denied_frame, Envelope};
use crate::http::link::{Link, LinkState};
use crate::http::pending::PendingRequests;
use crate::http::upstream::UpstreamTarget;
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionKind, ConnectionTracker};
use crate::observability::metrics::{self, Transport};

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bridge timings.
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    pub pending_ttl: Duration,
}

impl From<&WebSocketConfig> for WsSettings {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            ready_poll: Duration::from_millis(config.ready_poll_ms),
            pending_ttl: Duration::from_secs(config.pending_ttl_secs),
        }
    }
}

/// Per-bridge handles shared by the pumps.
struct Ends {
    client: Link,
    upstream: Link,
    to_client: mpsc::UnboundedSender<Message>,
    to_upstream: mpsc::UnboundedSender<UpstreamMessage>,
    pending: PendingRequests,
}

#[derive(Clone)]
pub struct WebSocketBridge {
    selector: Arc<BehaviorSelector>,
    delays: Arc<DelayController>,
    target: Arc<UpstreamTarget>,
    settings: WsSettings,
    tracker: ConnectionTracker,
    shutdown: ShutdownSignal,
}

impl WebSocketBridge {
    pub fn new(
        selector: Arc<BehaviorSelector>,
        delays: Arc<DelayController>,
        target: Arc<UpstreamTarget>,
        settings: WsSettings,
        tracker: ConnectionTracker,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            selector,
            delays,
            target,
            settings,
            tracker,
            shutdown,
        }
    }

    /// Complete the client handshake and bridge to the matching upstream path.
    pub fn accept(&self, upgrade: WebSocketUpgrade, path_and_query: Option<PathAndQuery>) -> Response {
        let bridge = self.clone();
        let upstream_url = self.target.ws_url(path_and_query.as_ref());
        upgrade.on_upgrade(move |socket| bridge.run(socket, upstream_url))
    }

    async fn run(self, socket: WebSocket, upstream_url: String) {
        let guard = self.tracker.track(ConnectionKind::WebSocket);
        let span = tracing::info_span!("ws_bridge", connection_id = %guard.id());
        self.bridge(socket, upstream_url).instrument(span).await;
        drop(guard);
    }

    async fn bridge(&self, socket: WebSocket, upstream_url: String) {
        metrics::ws_connection_opened();
        tracing::info!(upstream = %upstream_url, "WebSocket client connected");

        let (client_sink, client_stream) = socket.split();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (to_upstream, upstream_rx) = mpsc::unbounded_channel();
        let ends = Arc::new(Ends {
            client: Link::new(Peer::Client, LinkState::Open),
            upstream: Link::new(Peer::Upstream, LinkState::Connecting),
            to_client,
            to_upstream,
            pending: PendingRequests::new(self.settings.pending_ttl, self.tracker.clone()),
        });

        let client_writer = tokio::spawn(
            write_client(client_sink, client_rx, ends.client.clone()).in_current_span(),
        );
        let upstream_task = tokio::spawn(
            self.clone()
                .run_upstream(upstream_url, upstream_rx, Arc::clone(&ends))
                .in_current_span(),
        );

        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = self.pump_client(client_stream, &ends) => {
                tracing::info!("Client closed; closing upstream");
            }
            _ = ends.upstream.closed() => {
                tracing::info!("Upstream closed; closing client");
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutdown; closing WebSocket bridge");
            }
        }

        ends.client.close();
        ends.upstream.close();
        let _ = upstream_task.await;
        let _ = client_writer.await;

        metrics::ws_connection_closed();
        tracing::info!(unanswered = ends.pending.len(), "WebSocket bridge closed");
    }

    async fn pump_client(&self, mut stream: SplitStream<WebSocket>, ends: &Ends) {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "Client socket error");
                    return;
                }
            };
            let frame = match frame {
                Message::Text(text) => UpstreamMessage::Text(text.as_str().to_owned().into()),
                Message::Binary(bytes) => UpstreamMessage::Binary(bytes),
                Message::Close(_) => return,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            self.on_client_frame(frame, ends).await;
        }
    }

    async fn on_client_frame(&self, frame: UpstreamMessage, ends: &Ends) {
        let envelope = Envelope::parse(payload(&frame)).unwrap_or_default();
        let method = envelope.method_name();
        let behavior = self.selector.select_behavior(method);
        metrics::record_behavior(Transport::WebSocket, behavior);

        match behavior {
            BehaviorKind::NotAnswer => {
                tracing::info!(method = %method, id = ?envelope.id, "Dropping frame");
            }
            BehaviorKind::Fail => {
                tracing::info!(method = %method, id = ?envelope.id, "Failing frame");
                let reply = proxy_denied_frame(envelope.id.as_ref());
                if ends.to_client.send(Message::Text(reply.into())).is_err() {
                    metrics::record_dropped_frame("to_client");
                }
            }
            BehaviorKind::Forward => {
                if let Some(id) = &envelope.id {
                    ends.pending.track(id, method);
                }
                self.delays.apply_pre().await;

                let ready = ends
                    .upstream
                    .wait_ready(self.settings.ready_timeout, self.settings.ready_poll)
                    .await;
                match ready {
                    Ok(()) => {
                        if ends.to_upstream.send(frame).is_err() {
                            metrics::record_dropped_frame("to_upstream");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(method = %method, error = %e, "Dropping frame for upstream");
                        metrics::record_dropped_frame("to_upstream");
                    }
                }
            }
        }
    }

    async fn run_upstream(
        self,
        url: String,
        mut outbound: mpsc::UnboundedReceiver<UpstreamMessage>,
        ends: Arc<Ends>,
    ) {
        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = ends.upstream.closed() => return,
        };
        let socket: UpstreamSocket = match connected {
            Ok((socket, _)) => socket,
            Err(e) => {
                tracing::warn!(upstream = %url, error = %e, "Upstream WebSocket connect failed");
                metrics::record_upstream_error(Transport::WebSocket);
                ends.upstream.close();
                return;
            }
        };
        ends.upstream.open();
        tracing::info!(upstream = %url, "Upstream WebSocket connected");

        let (mut sink, stream) = socket.split();
        let writer = async {
            while let Some(frame) = outbound.recv().await {
                if let Err(e) = sink.send(frame).await {
                    tracing::debug!(error = %e, "Upstream write failed");
                    return;
                }
            }
        };

        tokio::select! {
            _ = writer => {}
            _ = self.pump_upstream(stream, &ends) => {}
            _ = ends.upstream.closed() => {}
        }
        ends.upstream.close();
        let _ = sink.close().await;
    }

    async fn pump_upstream(&self, mut stream: SplitStream<UpstreamSocket>, ends: &Ends) {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "Upstream socket error");
                    return;
                }
            };
            let frame = match frame {
                UpstreamMessage::Text(text) => Message::Text(text.as_str().to_owned().into()),
                UpstreamMessage::Binary(bytes) => Message::Binary(bytes),
                UpstreamMessage::Close(_) => return,
                _ => continue,
            };

            if let Some(Envelope { id: Some(id), .. }) = Envelope::parse(client_payload(&frame)) {
                if let Some(request) = ends.pending.complete(&id) {
                    let latency = request.started_at.elapsed();
                    tracing::info!(
                        id = %id,
                        method = %request.method,
                        latency_ms = latency.as_millis() as u64,
                        "Upstream response"
                    );
                    metrics::record_ws_latency(&request.method, latency);
                }
            }

            self.delays.apply_post().await;
            let ready = ends
                .client
                .wait_ready(self.settings.ready_timeout, self.settings.ready_poll)
                .await;
            match ready {
                Ok(()) => {
                    if ends.to_client.send(frame).is_err() {
                        metrics::record_dropped_frame("to_client");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping frame for client");
                    metrics::record_dropped_frame("to_client");
                }
            }
        }
    }
}

/// Drain queued frames to the client. On close, flushes what is already
/// queued and sends a close frame.
async fn write_client(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::UnboundedReceiver<Message>,
    link: Link,
) {
    loop {
        tokio::select! {
            biased;
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        tracing::debug!(error = %e, "Client write failed");
                        break;
                    }
                }
                None => break,
            },
            _ = link.closed() => {
                while let Ok(frame) = frames.try_recv() {
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    link.close();
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

fn payload(frame: &UpstreamMessage) -> &[u8] {
    match frame {
        UpstreamMessage::Text(text) => text.as_str().as_bytes(),
        UpstreamMessage::Binary(bytes) => &bytes[..],
        _ => &[],
    }
}

fn client_payload(frame: &Message) -> &[u8] {
    match frame {
        Message::Text(text) => text.as_str().as_bytes(),
        Message::Binary(bytes) => &bytes[..],
        _ => &[],
    }
}

//! Proxy transports.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, upgrade detection)
//!     → bridge.rs (HTTP: one request, one behavior)
//!     → websocket.rs (WebSocket: one behavior per client frame)
//!     → upstream.rs (forward to the real node)
//! ```

pub mod bridge;
pub mod error;
pub mod jsonrpc;
pub mod link;
pub mod pending;
pub mod server;
pub mod upstream;
pub mod websocket;

pub use bridge::HttpBridge;
pub use error::{BridgeError, BridgeResult, Peer};
pub use server::{build_router, AppState};
pub use upstream::{UpstreamClient, UpstreamTarget};
pub use websocket::{WebSocketBridge, WsSettings};

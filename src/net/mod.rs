//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (accepted by axum::serve)
//!     → connection.rs (id assignment, lifetime tracking)
//!     → Hand off to HTTP / WebSocket bridges
//!
//! Tracked connection states:
//!     Active → Closed
//! ```
//!
//! # Design Decisions
//! - Only long-lived connections are tracked (bridges, hung responses)
//! - Shutdown waits for tracked connections with a deadline

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionKind, ConnectionTracker};

//! Connection identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for log correlation
//! - Count long-lived connections (WebSocket bridges, hung HTTP responses)
//! - Let shutdown wait until every tracked connection is gone
//! - Count forwarded WebSocket requests still awaiting a response

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What a tracked connection is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    WebSocket,
    HungResponse,
}

impl ConnectionKind {
    fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::WebSocket => "websocket",
            ConnectionKind::HungResponse => "hung_response",
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    websocket: AtomicU64,
    hung: AtomicU64,
    pending: AtomicU64,
    idle: Notify,
}

impl Counts {
    fn counter(&self, kind: ConnectionKind) -> &AtomicU64 {
        match kind {
            ConnectionKind::WebSocket => &self.websocket,
            ConnectionKind::HungResponse => &self.hung,
        }
    }

    fn total(&self) -> u64 {
        self.websocket.load(Ordering::SeqCst) + self.hung.load(Ordering::SeqCst)
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counts: Arc<Counts>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self, kind: ConnectionKind) -> ConnectionGuard {
        self.counts.counter(kind).fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            counts: Arc::clone(&self.counts),
            kind,
            id: ConnectionId::new(),
        }
    }

    pub fn active(&self, kind: ConnectionKind) -> u64 {
        self.counts.counter(kind).load(Ordering::SeqCst)
    }

    pub fn active_total(&self) -> u64 {
        self.counts.total()
    }

    /// Forwarded WebSocket requests not yet answered, across all bridges.
    /// Not part of the drain condition.
    pub fn pending_requests(&self) -> u64 {
        self.counts.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn add_pending(&self) {
        self.counts.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn remove_pending(&self, n: u64) {
        self.counts.pending.fetch_sub(n, Ordering::SeqCst);
    }

    /// Wait until no tracked connection is left, or `deadline` elapses.
    /// Returns true when drained.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.counts.idle.notified();
                if self.counts.total() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    counts: Arc<Counts>,
    kind: ConnectionKind,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counts.counter(self.kind).fetch_sub(1, Ordering::SeqCst);
        if self.counts.total() == 0 {
            self.counts.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, kind = self.kind.as_str(), "Connection closed");
    }
}

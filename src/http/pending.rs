//! Per-connection table of forwarded WebSocket requests awaiting a response.
//!
//! # Responsibilities
//! - Remember when each request id was forwarded, and for which method
//! - Hand the entry back when the matching response arrives
//! - Forget entries that never get an answer after a TTL
//!
//! # Design Decisions
//! - One table per bridge; ids are only unique within a connection
//! - A reused id replaces the older entry; its expiry timer is matched by
//!   sequence number so it never evicts the newer one
//! - Expiry timers hold a weak reference and do nothing once the bridge is gone
//! - Every live entry is mirrored in the tracker's pending count; entries
//!   left when the table drops are subtracted in one step

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::http::jsonrpc::id_key;
use crate::net::ConnectionTracker;

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: String,
    pub started_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct Table {
    entries: DashMap<String, PendingRequest>,
    next_seq: AtomicU64,
    tracker: ConnectionTracker,
}

impl Drop for Table {
    fn drop(&mut self) {
        self.tracker.remove_pending(self.entries.len() as u64);
    }
}

#[derive(Debug, Clone)]
pub struct PendingRequests {
    table: Arc<Table>,
    ttl: Duration,
}

impl PendingRequests {
    pub fn new(ttl: Duration, tracker: ConnectionTracker) -> Self {
        Self {
            table: Arc::new(Table {
                entries: DashMap::new(),
                next_seq: AtomicU64::new(0),
                tracker,
            }),
            ttl,
        }
    }

    /// Record a forwarded request. Must be called from within a Tokio runtime.
    pub fn track(&self, id: &Value, method: &str) {
        let key = id_key(id);
        let seq = self.table.next_seq.fetch_add(1, Ordering::Relaxed);
        let replaced = self.table.entries.insert(
            key.clone(),
            PendingRequest {
                method: method.to_string(),
                started_at: Instant::now(),
                seq,
            },
        );
        if replaced.is_none() {
            self.table.tracker.add_pending();
        }

        let table: Weak<Table> = Arc::downgrade(&self.table);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(table) = table.upgrade() {
                if table.entries.remove_if(&key, |_, entry| entry.seq == seq).is_some() {
                    table.tracker.remove_pending(1);
                    tracing::debug!(id = %key, "Pending request expired without a response");
                }
            }
        });
    }

    /// Take the entry for `id`, if one is pending.
    pub fn complete(&self, id: &Value) -> Option<PendingRequest> {
        let (_, entry) = self.table.entries.remove(&id_key(id))?;
        self.table.tracker.remove_pending(1);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.table.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries.is_empty()
    }
}

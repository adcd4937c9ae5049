//! Readiness state of one side of a WebSocket bridge.
//!
//! A frame headed for a socket that is still connecting waits here, bounded
//! by a budget. The state only moves forward: Connecting → Open → Closed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::http::error::{BridgeError, BridgeResult, Peer};

/// Floor for the re-check interval; a zero poll would spin.
const MIN_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

/// Shared handle on a socket's readiness.
#[derive(Debug, Clone)]
pub struct Link {
    peer: Peer,
    tx: Arc<watch::Sender<LinkState>>,
}

impl Link {
    pub fn new(peer: Peer, initial: LinkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            peer,
            tx: Arc::new(tx),
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    pub fn state(&self) -> LinkState {
        *self.tx.borrow()
    }

    /// Mark the socket open. No effect once closed.
    pub fn open(&self) {
        self.tx.send_if_modified(|state| {
            if *state == LinkState::Connecting {
                *state = LinkState::Open;
                true
            } else {
                false
            }
        });
    }

    /// Mark the socket closed. Returns true on the first call.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state != LinkState::Closed {
                *state = LinkState::Closed;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once the socket is closed.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state == LinkState::Closed).await;
    }

    /// Wait until the socket is open, re-checking every `poll`, for at most `budget`.
    pub async fn wait_ready(&self, budget: Duration, poll: Duration) -> BridgeResult<()> {
        let started = Instant::now();
        let mut rx = self.tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                LinkState::Open => return Ok(()),
                LinkState::Closed => return Err(BridgeError::PeerClosed { peer: self.peer }),
                LinkState::Connecting => {}
            }

            let waited = started.elapsed();
            if waited >= budget {
                return Err(BridgeError::PeerUnavailable {
                    peer: self.peer,
                    waited,
                });
            }
            let step = poll_step(poll, budget - waited);
            let _ = tokio::time::timeout(step, rx.changed()).await;
        }
    }
}

fn poll_step(poll: Duration, remaining: Duration) -> Duration {
    poll.max(MIN_POLL).min(remaining)
}

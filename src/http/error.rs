//! Runtime errors raised while proxying.
//!
//! None of these reach a peer as-is: the HTTP bridge maps them to a 500
//! response and the WebSocket bridge logs them and drops the frame.

use std::time::Duration;
use thiserror::Error;

/// One side of a WebSocket bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Client,
    Upstream,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Client => f.write_str("client"),
            Peer::Upstream => f.write_str("upstream"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket never reached the open state within the readiness budget.
    #[error("{peer} connection not ready after {waited:?}")]
    PeerUnavailable { peer: Peer, waited: Duration },

    /// Socket closed while a frame was waiting for it.
    #[error("{peer} connection closed")]
    PeerClosed { peer: Peer },

    /// Network failure talking to upstream over HTTP.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Upstream did not answer within the request timeout.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Request or response body could not be read.
    #[error("failed to read body: {0}")]
    BodyRead(String),

    #[error("invalid upstream URL: {0}")]
    InvalidUpstream(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::PeerUnavailable {
            peer: Peer::Upstream,
            waited: Duration::from_millis(1000),
        };
        assert_eq!(err.to_string(), "upstream connection not ready after 1s");

        let err = BridgeError::Transport("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}

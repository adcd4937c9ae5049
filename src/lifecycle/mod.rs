//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (proxy.rs):
//!     Config → Registry + delays → Bind proxy listener → Bind admin listener
//!
//! Shutdown (shutdown.rs):
//!     stop() → trigger signal → hung bodies end, WebSocket bridges close
//!            → listeners stop → drain tracked connections
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop()
//! ```
//!
//! # Design Decisions
//! - One watch-based signal fans out to every long-lived task
//! - Shutdown has a drain deadline: stop() never waits forever

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, rule compilation)
//!     → ProxyConfig (validated, consumed once at construction)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → rules and delays swapped into the running proxy
//! ```
//!
//! # Design Decisions
//! - Listener, upstream and timing settings are fixed at startup
//! - Only the `[chaos]` and `[delays]` sections are hot-reloadable
//! - All fields have defaults to allow minimal configs

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, ChaosConfig, DefaultSpec, DelaysConfig, ListenerConfig, ObservabilityConfig,
    ProxyConfig, RuleSpec, UpstreamConfig, WebSocketConfig,
};

//! JSON-RPC chaos proxy library.

pub mod admin;
pub mod chaos;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use chaos::{
    BehaviorKind, BehaviorSelector, ConfigurationError, MethodMatcher, ProbabilityTable,
    RuleConfig, SelectionMode,
};
pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{ChaosControl, ChaosProxy, ProxyError};

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::chaos::behavior::{BehaviorKind, ProbabilityTable, SelectionMode};
use crate::chaos::delay::DelayConfig;
use crate::chaos::matcher::MatcherSpec;

/// Root configuration for the chaos proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Real RPC node the proxy forwards to.
    pub upstream: UpstreamConfig,

    /// Initial injected latency.
    pub delays: DelaysConfig,

    /// WebSocket bridge timings.
    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin control API.
    pub admin: AdminConfig,

    /// Initial rule configuration.
    pub chaos: ChaosConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8545"). Port 0 picks a free port.
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8545".to_string(),
        }
    }
}

/// Upstream RPC node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// HTTP base URL (e.g., "http://127.0.0.1:8546").
    pub url: String,

    /// WebSocket URL. Derived from `url` (http→ws) when unset.
    pub ws_url: Option<String>,

    /// Total time allowed for one forwarded HTTP call, in seconds.
    pub request_timeout_secs: u64,

    /// Largest request or response body buffered, in bytes.
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8546".to_string(),
            ws_url: None,
            request_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Initial delay values; runtime calls override them.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DelaysConfig {
    /// Delay before forwarding to upstream, in milliseconds.
    pub pre_ms: u64,

    /// Delay before relaying the response, in milliseconds.
    pub post_ms: u64,
}

impl From<DelaysConfig> for DelayConfig {
    fn from(config: DelaysConfig) -> Self {
        DelayConfig {
            pre_delay_ms: config.pre_ms,
            post_delay_ms: config.post_ms,
        }
    }
}

/// WebSocket bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// How long a frame waits for the destination socket to be ready.
    pub ready_timeout_ms: u64,

    /// Readiness re-check interval while waiting.
    pub ready_poll_ms: u64,

    /// Lifetime of an uncorrelated pending request, in seconds.
    pub pending_ttl_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 1000,
            ready_poll_ms: 100,
            pending_ttl_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin control API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Initial rules and default behavior.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChaosConfig {
    /// Seed for random rules; unset means seeded from OS entropy.
    pub seed: Option<u64>,

    /// Fallback configuration.
    pub default: DefaultSpec,

    /// Rules in evaluation order.
    pub rules: Vec<RuleSpec>,
}

/// Default (fallback) behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultSpec {
    pub mode: SelectionMode,
    pub queue: Vec<BehaviorKind>,
    pub probs: Option<ProbabilityTable>,
}

impl Default for DefaultSpec {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Deterministic,
            queue: Vec::new(),
            probs: None,
        }
    }
}

/// One rule: a matcher plus either a behavior queue or a probability table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RuleSpec {
    /// Exact method name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Regular expression over the method name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Deterministic queue, consumed front to back.
    #[serde(default)]
    pub behaviors: Vec<BehaviorKind>,

    /// Probability table; makes the rule random.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probs: Option<ProbabilityTable>,
}

impl RuleSpec {
    pub fn matcher_spec(&self) -> MatcherSpec {
        MatcherSpec {
            method: self.method.clone(),
            pattern: self.pattern.clone(),
        }
    }
}

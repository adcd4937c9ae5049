//! Proxy assembly and lifecycle.
//!
//! # Responsibilities
//! - Own the shared behavior selector and delay controller
//! - Expose the runtime control surface
//! - Bind the proxy (and admin) listeners and serve until stopped
//!
//! # Design Decisions
//! - Control calls go through [`ChaosControl`], a cheap clone that can be
//!   handed to the admin API and the config reloader
//! - `stop()` resolves only after the serve tasks joined and every tracked
//!   WebSocket bridge and hung response is gone (bounded by a drain deadline)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::chaos::{
    BehaviorKind, BehaviorSelector, ConfigResult, ConfigurationError, DelayConfig, DelayController,
    MethodMatcher, ProbabilityTable, RegistrySnapshot, RuleConfig, RuleRegistry, SelectionMode,
};
use crate::config::ProxyConfig;
use crate::http::{
    build_router, AppState, BridgeError, HttpBridge, UpstreamClient, UpstreamTarget,
    WebSocketBridge, WsSettings,
};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionKind, ConnectionTracker};

/// How long `stop()` waits for open bridges to close.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy is already running")]
    AlreadyRunning,

    #[error("proxy is not running")]
    NotRunning,

    #[error("invalid chaos configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Upstream(#[from] BridgeError),

    #[error("server task failed: {0}")]
    Serve(String),
}

/// Runtime control surface, shared by the proxy, the admin API and reloads.
#[derive(Debug, Clone)]
pub struct ChaosControl {
    selector: Arc<BehaviorSelector>,
    delays: Arc<DelayController>,
}

impl ChaosControl {
    pub fn new(selector: Arc<BehaviorSelector>, delays: Arc<DelayController>) -> Self {
        Self { selector, delays }
    }

    pub fn add_rule(&self, matcher: MethodMatcher, config: impl Into<RuleConfig>) -> ConfigResult<()> {
        self.selector.add_rule(matcher, config)
    }

    pub fn push_rule_behavior(&self, matcher: &MethodMatcher, behavior: BehaviorKind) -> ConfigResult<()> {
        self.selector.push_rule_behavior(matcher, behavior)
    }

    pub fn clear_rules(&self) {
        self.selector.clear_rules()
    }

    pub fn set_default_mode(&self, mode: SelectionMode, probs: Option<ProbabilityTable>) -> ConfigResult<()> {
        self.selector.set_default_mode(mode, probs)
    }

    pub fn add_behavior(&self, behavior: BehaviorKind) {
        self.selector.add_behavior(behavior)
    }

    pub fn clear_default_queue(&self) {
        self.selector.clear_default_queue()
    }

    pub fn set_pre_delay(&self, ms: u64) {
        self.delays.set_pre_delay(ms)
    }

    pub fn set_post_delay(&self, ms: u64) {
        self.delays.set_post_delay(ms)
    }

    pub fn delays(&self) -> DelayConfig {
        self.delays.current()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.selector.snapshot()
    }

    /// Replace rules, default and delays from a reloaded configuration.
    /// Nothing changes if the chaos section is invalid.
    pub fn apply_config(&self, config: &ProxyConfig) -> ConfigResult<()> {
        let registry = RuleRegistry::from_config(&config.chaos)?;
        self.selector.replace(registry);
        self.delays.set(config.delays.into());
        Ok(())
    }
}

struct Running {
    shutdown: Shutdown,
    local_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<std::io::Result<()>>>,
}

/// The chaos proxy: a reverse proxy for JSON-RPC over HTTP and WebSocket.
pub struct ChaosProxy {
    config: ProxyConfig,
    selector: Arc<BehaviorSelector>,
    delays: Arc<DelayController>,
    control: ChaosControl,
    tracker: ConnectionTracker,
    running: Option<Running>,
}

impl ChaosProxy {
    /// Build a proxy from configuration. The chaos section seeds the rules.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let registry = RuleRegistry::from_config(&config.chaos)?;
        let selector = Arc::new(BehaviorSelector::with_registry(registry, config.chaos.seed));
        let delays = Arc::new(DelayController::new(config.delays.into()));
        let control = ChaosControl::new(Arc::clone(&selector), Arc::clone(&delays));

        Ok(Self {
            config,
            selector,
            delays,
            control,
            tracker: ConnectionTracker::new(),
            running: None,
        })
    }

    pub fn control(&self) -> ChaosControl {
        self.control.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bound proxy address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Bound admin address while running, if the admin API is enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().and_then(|r| r.admin_addr)
    }

    pub fn active_websockets(&self) -> u64 {
        self.tracker.active(ConnectionKind::WebSocket)
    }

    /// Forwarded WebSocket requests still waiting for an upstream response.
    pub fn pending_requests(&self) -> u64 {
        self.tracker.pending_requests()
    }

    pub fn add_rule(&self, matcher: MethodMatcher, config: impl Into<RuleConfig>) -> ConfigResult<()> {
        self.control.add_rule(matcher, config)
    }

    pub fn push_rule_behavior(&self, matcher: &MethodMatcher, behavior: BehaviorKind) -> ConfigResult<()> {
        self.control.push_rule_behavior(matcher, behavior)
    }

    pub fn clear_rules(&self) {
        self.control.clear_rules()
    }

    pub fn set_default_mode(&self, mode: SelectionMode, probs: Option<ProbabilityTable>) -> ConfigResult<()> {
        self.control.set_default_mode(mode, probs)
    }

    pub fn add_behavior(&self, behavior: BehaviorKind) {
        self.control.add_behavior(behavior)
    }

    pub fn clear_default_queue(&self) {
        self.control.clear_default_queue()
    }

    pub fn set_pre_delay(&self, ms: u64) {
        self.control.set_pre_delay(ms)
    }

    pub fn set_post_delay(&self, ms: u64) {
        self.control.set_post_delay(ms)
    }

    /// Bind and start serving. Returns the bound proxy address.
    pub async fn start(&mut self) -> Result<SocketAddr, ProxyError> {
        if self.running.is_some() {
            return Err(ProxyError::AlreadyRunning);
        }

        let shutdown = Shutdown::new();
        let target = Arc::new(UpstreamTarget::from_config(&self.config.upstream)?);
        let http = HttpBridge::new(
            Arc::clone(&self.selector),
            Arc::clone(&self.delays),
            Arc::clone(&target),
            UpstreamClient::from_config(&self.config.upstream),
            self.tracker.clone(),
            shutdown.subscribe(),
            self.config.upstream.max_body_bytes,
        );
        let websocket = WebSocketBridge::new(
            Arc::clone(&self.selector),
            Arc::clone(&self.delays),
            Arc::clone(&target),
            WsSettings::from(&self.config.websocket),
            self.tracker.clone(),
            shutdown.subscribe(),
        );

        // Bind everything before spawning so a failed bind leaves nothing running.
        let listener = bind(&self.config.listener.bind_address).await?;
        let local_addr = local_addr_of(&listener, &self.config.listener.bind_address)?;
        let admin_listener = if self.config.admin.enabled {
            Some(bind(&self.config.admin.bind_address).await?)
        } else {
            None
        };
        let admin_addr = match &admin_listener {
            Some(l) => Some(local_addr_of(l, &self.config.admin.bind_address)?),
            None => None,
        };

        let app = build_router(AppState { http, websocket });
        let signal = shutdown.subscribe();
        let mut tasks = vec![tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(signal.recv())
                .await
        })];

        if let Some(listener) = admin_listener {
            let admin = setup_admin_router(AdminState {
                control: self.control.clone(),
                tracker: self.tracker.clone(),
            });
            let signal = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                axum::serve(listener, admin.into_make_service())
                    .with_graceful_shutdown(signal.recv())
                    .await
            }));
        }

        tracing::info!(
            address = %local_addr,
            admin = ?admin_addr,
            upstream = %target.http_base(),
            upstream_ws = %target.ws_base(),
            "Chaos proxy listening"
        );

        self.running = Some(Running {
            shutdown,
            local_addr,
            admin_addr,
            tasks,
        });
        Ok(local_addr)
    }

    /// Close the listeners and every active bridge.
    pub async fn stop(&mut self) -> Result<(), ProxyError> {
        let running = self.running.take().ok_or(ProxyError::NotRunning)?;
        tracing::info!(address = %running.local_addr, "Stopping chaos proxy");
        running.shutdown.trigger();

        let mut failure = None;
        for task in running.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Server exited with error");
                    failure.get_or_insert(ProxyError::Serve(e.to_string()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Server task panicked");
                    failure.get_or_insert(ProxyError::Serve(e.to_string()));
                }
            }
        }

        if !self.tracker.wait_idle(DRAIN_DEADLINE).await {
            tracing::warn!(
                remaining = self.tracker.active_total(),
                "Connections still open after drain deadline"
            );
        }
        tracing::info!("Chaos proxy stopped");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ChaosProxy {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.trigger();
        }
    }
}

async fn bind(address: &str) -> Result<TcpListener, ProxyError> {
    TcpListener::bind(address).await.map_err(|source| ProxyError::Bind {
        address: address.to_string(),
        source,
    })
}

fn local_addr_of(listener: &TcpListener, address: &str) -> Result<SocketAddr, ProxyError> {
    listener.local_addr().map_err(|source| ProxyError::Bind {
        address: address.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.admin.bind_address = "127.0.0.1:0".into();
        config
    }

    #[tokio::test]
    async fn test_start_stop() {
        let mut proxy = ChaosProxy::new(test_config()).unwrap();
        assert!(matches!(proxy.stop().await, Err(ProxyError::NotRunning)));

        let addr = proxy.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(proxy.local_addr(), Some(addr));
        assert!(proxy.admin_addr().is_some());
        assert!(matches!(proxy.start().await, Err(ProxyError::AlreadyRunning)));

        proxy.stop().await.unwrap();
        assert!(proxy.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let mut config = test_config();
        config.admin.enabled = false;
        let mut first = ChaosProxy::new(config.clone()).unwrap();
        let addr = first.start().await.unwrap();

        config.listener.bind_address = addr.to_string();
        let mut second = ChaosProxy::new(config).unwrap();
        assert!(matches!(second.start().await, Err(ProxyError::Bind { .. })));
        first.stop().await.unwrap();
    }

    #[test]
    fn test_invalid_chaos_config_rejected() {
        let mut config = test_config();
        config.chaos.default.mode = SelectionMode::Random;
        assert!(matches!(
            ChaosProxy::new(config),
            Err(ProxyError::Configuration(ConfigurationError::MissingProbabilities))
        ));
    }

    #[test]
    fn test_apply_config_replaces_rules_and_delays() {
        let proxy = ChaosProxy::new(test_config()).unwrap();
        proxy.add_rule(MethodMatcher::exact("old"), BehaviorKind::Fail).unwrap();

        let mut next = test_config();
        next.delays.pre_ms = 25;
        next.chaos.default.queue = vec![BehaviorKind::NotAnswer];
        proxy.control().apply_config(&next).unwrap();

        let snapshot = proxy.control().snapshot();
        assert!(snapshot.rules.is_empty());
        assert_eq!(snapshot.default.queue, vec![BehaviorKind::NotAnswer]);
        assert_eq!(proxy.control().delays().pre_delay_ms, 25);
    }
}

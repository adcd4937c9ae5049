//! JSON-RPC chaos proxy.
//!
//! Sits between a client and a real RPC node and, per request or per
//! WebSocket frame, forwards, fails or swallows the call according to
//! runtime-configurable rules.
//!
//! ```text
//!                 ┌───────────────────────────── CHAOS PROXY ─────────────────────────────┐
//!                 │                                                                       │
//!  Client ────────┼─▶ server (axum) ──▶ HttpBridge / WebSocketBridge ──▶ BehaviorSelector │
//!                 │                               │                           │           │
//!                 │                    Forward ◀──┴── pre/post delay ──┐      ▼           │
//!                 │                       │                            │  RuleRegistry    │
//!                 │                       ▼                            │                  │
//!                 │                  upstream client ──────────────────┼──────────────────┼──▶ RPC node
//!                 │                                                                       │
//!                 │  admin API ──▶ ChaosControl        config watcher ──▶ ChaosControl    │
//!                 └───────────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use rpc_chaos_proxy::config::loader::load_config;
use rpc_chaos_proxy::config::validation::validate_config;
use rpc_chaos_proxy::config::watcher::ConfigWatcher;
use rpc_chaos_proxy::config::ProxyConfig;
use rpc_chaos_proxy::lifecycle::signals::wait_for_termination;
use rpc_chaos_proxy::observability::{logging::init_logging, metrics::init_metrics};
use rpc_chaos_proxy::ChaosProxy;

#[derive(Parser, Debug, Clone)]
#[command(name = "rpc-chaos-proxy", version)]
#[command(about = "Chaos-testing reverse proxy for JSON-RPC over HTTP and WebSocket", long_about = None)]
struct Args {
    /// TOML configuration file; watched for rule and delay changes.
    #[arg(short, long, env = "CHAOS_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream RPC node URL (http://...).
    #[arg(short, long, env = "CHAOS_PROXY_UPSTREAM")]
    upstream: Option<String>,

    /// Listen port (0 picks a free port).
    #[arg(short, long, env = "CHAOS_PROXY_PORT")]
    port: Option<u16>,

    #[arg(long, env = "CHAOS_PROXY_PRE_DELAY_MS")]
    pre_delay_ms: Option<u64>,

    #[arg(long, env = "CHAOS_PROXY_POST_DELAY_MS")]
    post_delay_ms: Option<u64>,

    /// trace, debug, info, warn or error.
    #[arg(long, env = "CHAOS_PROXY_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "CHAOS_PROXY_JSON_LOGS")]
    json_logs: bool,

    /// Admin API bind address.
    #[arg(long, env = "CHAOS_PROXY_ADMIN_BIND")]
    admin_bind: Option<String>,
}

impl Args {
    /// Command-line values win over the file.
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(upstream) = &self.upstream {
            config.upstream.url = upstream.clone();
        }
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("127.0.0.1:{}", port),
            };
        }
        if let Some(ms) = self.pre_delay_ms {
            config.delays.pre_ms = ms;
        }
        if let Some(ms) = self.post_delay_ms {
            config.delays.post_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.json_logs {
            config.observability.json_logs = true;
        }
        if let Some(bind) = &self.admin_bind {
            config.admin.bind_address = bind.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("config error: {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    init_logging(&config.observability.log_level, config.observability.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rpc-chaos-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut proxy = ChaosProxy::new(config)?;
    proxy.start().await?;

    // Hot reload: keep the watcher handle alive for the life of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let control = proxy.control();
            let overrides = args.clone();
            tokio::spawn(async move {
                while let Some(mut next) = updates.recv().await {
                    overrides.apply(&mut next);
                    match control.apply_config(&next) {
                        Ok(()) => tracing::info!("Rules and delays reloaded"),
                        Err(e) => tracing::error!(error = %e, "Rejected reloaded configuration"),
                    }
                }
            });
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Config hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    wait_for_termination().await;
    proxy.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, upstream URL schemes and timing ranges
//! - Upstream must be plaintext (http/ws); TLS termination is left to the deployment
//! - Compile the configured rules once to surface rule errors at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::chaos::error::ConfigurationError;
use crate::chaos::registry::RuleRegistry;
use crate::config::schema::ProxyConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: invalid URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("chaos: {0}")]
    Chaos(#[from] ConfigurationError),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);
    if config.admin.enabled {
        check_address("admin.bind_address", &config.admin.bind_address, &mut errors);
    }
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    check_url("upstream.url", &config.upstream.url, &["http"], &mut errors);
    if let Some(ws_url) = &config.upstream.ws_url {
        check_url("upstream.ws_url", ws_url, &["ws"], &mut errors);
    }

    let positive = [
        ("upstream.request_timeout_secs", config.upstream.request_timeout_secs),
        ("upstream.max_body_bytes", config.upstream.max_body_bytes as u64),
        ("websocket.ready_timeout_ms", config.websocket.ready_timeout_ms),
        ("websocket.ready_poll_ms", config.websocket.ready_poll_ms),
        ("websocket.pending_ttl_secs", config.websocket.pending_ttl_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    if let Err(e) = RuleRegistry::from_config(&config.chaos) {
        errors.push(e.into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_url(field: &'static str, value: &str, schemes: &[&str], errors: &mut Vec<ValidationError>) {
    match url::Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RuleSpec;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.upstream.url = "ftp://example.com".into();
        config.websocket.ready_poll_ms = 0;
        config.chaos.rules.push(RuleSpec {
            method: Some("eth_call".into()),
            ..Default::default()
        });
        config.chaos.rules.push(RuleSpec {
            pattern: Some("(".into()),
            ..Default::default()
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Chaos(ConfigurationError::InvalidPattern { .. }))));
    }

    #[test]
    fn test_ws_url_scheme() {
        let mut config = ProxyConfig::default();
        config.upstream.ws_url = Some("http://127.0.0.1:8546".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidUrl { field: "upstream.ws_url", .. }));
    }
}

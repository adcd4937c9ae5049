use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::chaos::{
    BehaviorKind, ConfigurationError, DelayConfig, MatcherSpec, ProbabilityTable, RegistrySnapshot,
    SelectionMode,
};
use crate::config::RuleSpec;
use crate::http::jsonrpc::error_body;
use crate::net::ConnectionKind;

/// Rejected control call. Rendered as 400 `{ "error": ... }`.
#[derive(Debug)]
pub struct AdminError(ConfigurationError);

impl From<ConfigurationError> for AdminError {
    fn from(err: ConfigurationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Rejected control call");
        (StatusCode::BAD_REQUEST, Json(error_body(self.0.to_string()))).into_response()
    }
}

type AdminResult<T> = Result<Json<T>, AdminError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub delays: DelayConfig,
    pub active_websockets: u64,
    pub hung_responses: u64,
    pub pending_requests: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushBehaviorRequest {
    #[serde(flatten)]
    pub matcher: MatcherSpec,
    pub behavior: BehaviorKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DefaultModeRequest {
    pub mode: SelectionMode,
    #[serde(default)]
    pub probs: Option<ProbabilityTable>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueBehaviorRequest {
    pub behavior: BehaviorKind,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DelaysRequest {
    #[serde(default)]
    pub pre_ms: Option<u64>,
    #[serde(default)]
    pub post_ms: Option<u64>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        delays: state.control.delays(),
        active_websockets: state.tracker.active(ConnectionKind::WebSocket),
        hung_responses: state.tracker.active(ConnectionKind::HungResponse),
        pending_requests: state.tracker.pending_requests(),
    })
}

pub async fn get_rules(State(state): State<AdminState>) -> Json<RegistrySnapshot> {
    Json(state.control.snapshot())
}

pub async fn add_rule(
    State(state): State<AdminState>,
    Json(rule): Json<RuleSpec>,
) -> AdminResult<RegistrySnapshot> {
    let (matcher, config) = rule.compile()?;
    state.control.add_rule(matcher, config)?;
    Ok(Json(state.control.snapshot()))
}

pub async fn clear_rules(State(state): State<AdminState>) -> Json<RegistrySnapshot> {
    state.control.clear_rules();
    Json(state.control.snapshot())
}

pub async fn push_rule_behavior(
    State(state): State<AdminState>,
    Json(request): Json<PushBehaviorRequest>,
) -> AdminResult<RegistrySnapshot> {
    let matcher = request.matcher.compile()?;
    state.control.push_rule_behavior(&matcher, request.behavior)?;
    Ok(Json(state.control.snapshot()))
}

pub async fn set_default_mode(
    State(state): State<AdminState>,
    Json(request): Json<DefaultModeRequest>,
) -> AdminResult<RegistrySnapshot> {
    state.control.set_default_mode(request.mode, request.probs)?;
    Ok(Json(state.control.snapshot()))
}

pub async fn add_behavior(
    State(state): State<AdminState>,
    Json(request): Json<QueueBehaviorRequest>,
) -> Json<RegistrySnapshot> {
    state.control.add_behavior(request.behavior);
    Json(state.control.snapshot())
}

pub async fn clear_default_queue(State(state): State<AdminState>) -> Json<RegistrySnapshot> {
    state.control.clear_default_queue();
    Json(state.control.snapshot())
}

pub async fn set_delays(
    State(state): State<AdminState>,
    Json(request): Json<DelaysRequest>,
) -> Json<DelayConfig> {
    if let Some(ms) = request.pre_ms {
        state.control.set_pre_delay(ms);
    }
    if let Some(ms) = request.post_ms {
        state.control.set_post_delay(ms);
    }
    Json(state.control.delays())
}

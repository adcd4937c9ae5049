//! Admin control API.
//!
//! Serves the runtime control surface as JSON over HTTP on its own listener,
//! so it never collides with proxied paths.

pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use self::handlers::*;
use crate::net::ConnectionTracker;
use crate::proxy::ChaosControl;

#[derive(Clone)]
pub struct AdminState {
    pub control: ChaosControl,
    pub tracker: ConnectionTracker,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/rules", get(get_rules).post(add_rule).delete(clear_rules))
        .route("/admin/rules/push", post(push_rule_behavior))
        .route("/admin/default", put(set_default_mode))
        .route(
            "/admin/default/queue",
            post(add_behavior).delete(clear_default_queue),
        )
        .route("/admin/delays", put(set_delays))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

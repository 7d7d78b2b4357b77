//! FormBridge HTTP API
//!
//! Resource-scoped routes over the protocol engine. Envelopes and status
//! mapping:
//! - 200/201 success, 202 for an accepted submit pending delivery
//! - 400 `invalid_request` / `validation_error`
//! - 403 `invalid_resume_token` / `expired`
//! - 404 `not_found`
//! - 409 `conflict` / `needs_approval`
//! - 500 unexpected (detail stays in the log)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use fb_engine::{ApprovalManager, Engine, EventLog, IntakeRegistry, SubmissionManager};

pub mod config;
pub mod error;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SubmissionManager>,
    pub approvals: Arc<ApprovalManager>,
    pub event_log: Arc<EventLog>,
    pub registry: Arc<IntakeRegistry>,
}

impl AppState {
    pub fn from_engine(engine: &Engine) -> Self {
        Self {
            manager: engine.manager.clone(),
            approvals: engine.approvals.clone(),
            event_log: engine.event_log.clone(),
            registry: engine.registry.clone(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/intake/:intake_id/submissions",
            post(routes::submissions::create),
        )
        .route(
            "/intake/:intake_id/submissions/:id",
            get(routes::submissions::get).patch(routes::submissions::patch),
        )
        .route(
            "/intake/:intake_id/submissions/:id/submit",
            post(routes::submissions::submit),
        )
        .route(
            "/intake/:intake_id/submissions/:id/uploads",
            post(routes::uploads::request),
        )
        .route(
            "/intake/:intake_id/submissions/:id/uploads/:upload_id/confirm",
            post(routes::uploads::confirm),
        )
        .route("/submissions/:id/approve", post(routes::approvals::approve))
        .route("/submissions/:id/reject", post(routes::approvals::reject))
        .route(
            "/submissions/:id/request-changes",
            post(routes::approvals::request_changes),
        )
        .route("/submissions/:id/handoff", post(routes::handoff::issue))
        .route("/submissions/resume/:token", get(routes::handoff::resume))
        .route(
            "/submissions/resume/:token/resumed",
            post(routes::handoff::resumed),
        )
        .route("/submissions/:id/events", get(routes::events::list))
        .route(
            "/submissions/:id/events/export",
            get(routes::events::export),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Handoff routes: capability transfer between actors

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use fb_domain::{Actor, ErrorEnvelope, SubmissionId};
use fb_engine::{HandoffReply, SubmissionView};

use crate::error::{into_reply, ApiError, ApiResult};
use crate::routes::{ok, ApiOk};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffBody {
    #[serde(default = "default_handoff_actor")]
    pub actor: Actor,
}

fn default_handoff_actor() -> Actor {
    Actor::system("handoff")
}

/// POST /submissions/{id}/handoff
#[instrument(skip(state, body))]
pub async fn issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<HandoffBody>,
) -> ApiResult<Json<ApiOk<HandoffReply>>> {
    let reply = into_reply(
        state
            .manager
            .generate_handoff_url(&SubmissionId::from_string(id), &body.actor)
            .await,
    )?;
    Ok(ok(reply))
}

/// GET /submissions/resume/{resumeToken}
///
/// Used by a human's browser to pick up an agent-initiated session.
#[instrument(skip(state, token))]
pub async fn resume(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<ApiOk<SubmissionView>>> {
    match state.manager.get_by_token(&token).await? {
        Some(view) => Ok(ok(view)),
        None => Err(ApiError::Refused(ErrorEnvelope::invalid_resume_token())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumedBody {
    pub actor: Actor,
}

/// POST /submissions/resume/{resumeToken}/resumed
#[instrument(skip(state, token, body))]
pub async fn resumed(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<ResumedBody>,
) -> ApiResult<Json<ApiOk<SubmissionView>>> {
    let reply = into_reply(state.manager.handoff_resumed(&token, &body.actor).await)?;
    Ok(ok(reply))
}

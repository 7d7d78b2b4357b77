//! Reviewer decision routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use fb_domain::{
    Actor, ApproveSubmission, FieldComment, RejectSubmission, RequestChanges, SubmissionId,
};
use fb_engine::ReviewReply;

use crate::error::{into_reply, ApiResult};
use crate::routes::{ok, ApiOk};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    pub resume_token: String,
    pub actor: Actor,
    #[serde(default)]
    pub comment: Option<String>,
}

/// POST /submissions/{id}/approve
#[instrument(skip(state, body))]
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ApproveBody>,
) -> ApiResult<Json<ApiOk<ReviewReply>>> {
    let reply = into_reply(
        state
            .approvals
            .approve(ApproveSubmission {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                actor: body.actor,
                comment: body.comment,
            })
            .await,
    )?;
    Ok(ok(reply))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    pub resume_token: String,
    pub actor: Actor,
    pub reason: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// POST /submissions/{id}/reject
#[instrument(skip(state, body))]
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RejectBody>,
) -> ApiResult<Json<ApiOk<ReviewReply>>> {
    let reply = into_reply(
        state
            .approvals
            .reject(RejectSubmission {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                actor: body.actor,
                reason: body.reason,
                comment: body.comment,
            })
            .await,
    )?;
    Ok(ok(reply))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestChangesBody {
    pub resume_token: String,
    pub actor: Actor,
    pub field_comments: Vec<FieldComment>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// POST /submissions/{id}/request-changes
#[instrument(skip(state, body))]
pub async fn request_changes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RequestChangesBody>,
) -> ApiResult<Json<ApiOk<ReviewReply>>> {
    let reply = into_reply(
        state
            .approvals
            .request_changes(RequestChanges {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                actor: body.actor,
                field_comments: body.field_comments,
                comment: body.comment,
            })
            .await,
    )?;
    Ok(ok(reply))
}

//! Submission lifecycle routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use fb_domain::{
    Actor, CreateSubmission, FieldMap, IntakeSchema, NextAction, SetFields, SubmissionId,
    SubmissionState, SubmitSubmission,
};
use fb_engine::{CreateReply, SetFieldsReply, SubmitReply};

use crate::error::{into_reply, ApiError, ApiResult};
use crate::routes::{ok, ApiOk};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    pub actor: Actor,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub initial_fields: FieldMap,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

/// The create response additionally carries the intake schema so agents
/// can discover what to collect next.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
    pub resume_token: String,
    pub schema: IntakeSchema,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<NextAction>,
}

/// POST /intake/{intakeId}/submissions
#[instrument(skip(state, body), fields(intake_id = %intake_id))]
pub async fn create(
    State(state): State<AppState>,
    Path(intake_id): Path<String>,
    Json(body): Json<CreateBody>,
) -> ApiResult<impl IntoResponse> {
    let mut cmd =
        CreateSubmission::new(intake_id.as_str(), body.actor).initial_fields(body.initial_fields);
    if let Some(key) = body.idempotency_key {
        cmd = cmd.idempotency_key(key);
    }
    if let Some(ttl) = body.ttl_ms {
        cmd = cmd.ttl_ms(ttl);
    }

    let reply: CreateReply = into_reply(state.manager.create(cmd).await)?;

    let schema = state
        .registry
        .get(&intake_id)
        .map(|intake| intake.schema.clone())
        .unwrap_or_default();

    Ok((
        StatusCode::CREATED,
        ok(CreateResponse {
            submission_id: reply.submission_id,
            state: reply.state,
            resume_token: reply.resume_token,
            schema,
            missing_fields: reply.missing_fields,
            next_actions: reply.next_actions,
        }),
    ))
}

/// GET /intake/{intakeId}/submissions/{id}
#[instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path((_intake_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = SubmissionId::from_string(id);
    match state.manager.get(&id).await? {
        Some(view) => Ok(ok(view)),
        None => Err(ApiError::Refused(fb_domain::ErrorEnvelope::not_found(
            format!("submission `{id}` not found"),
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBody {
    pub resume_token: String,
    pub actor: Actor,
    pub fields: FieldMap,
}

/// PATCH /intake/{intakeId}/submissions/{id}
#[instrument(skip(state, body))]
pub async fn patch(
    State(state): State<AppState>,
    Path((_intake_id, id)): Path<(String, String)>,
    Json(body): Json<PatchBody>,
) -> ApiResult<Json<ApiOk<SetFieldsReply>>> {
    let reply = into_reply(
        state
            .manager
            .set_fields(SetFields {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                actor: body.actor,
                fields: body.fields,
            })
            .await,
    )?;
    Ok(ok(reply))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub resume_token: String,
    pub actor: Actor,
    pub idempotency_key: String,
}

/// POST /intake/{intakeId}/submissions/{id}/submit
///
/// 202: accepted, delivery proceeds asynchronously.
#[instrument(skip(state, body))]
pub async fn submit(
    State(state): State<AppState>,
    Path((_intake_id, id)): Path<(String, String)>,
    Json(body): Json<SubmitBody>,
) -> ApiResult<impl IntoResponse> {
    let reply: SubmitReply = into_reply(
        state
            .manager
            .submit(SubmitSubmission {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                actor: body.actor,
                idempotency_key: body.idempotency_key,
            })
            .await,
    )?;

    let status = if reply.state == SubmissionState::Submitted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, ok(reply)))
}

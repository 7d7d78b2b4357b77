//! Upload negotiation routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use fb_domain::{Actor, ConfirmUpload, RequestUpload, SubmissionId, UploadId};
use fb_engine::{ConfirmUploadReply, UploadNegotiation};

use crate::error::{into_reply, ApiResult};
use crate::routes::{ok, ApiOk};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUploadBody {
    pub resume_token: String,
    pub actor: Actor,
    pub field_path: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// POST /intake/{intakeId}/submissions/{id}/uploads
#[instrument(skip(state, body))]
pub async fn request(
    State(state): State<AppState>,
    Path((_intake_id, id)): Path<(String, String)>,
    Json(body): Json<RequestUploadBody>,
) -> ApiResult<Json<ApiOk<UploadNegotiation>>> {
    let reply = into_reply(
        state
            .manager
            .request_upload(RequestUpload {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                actor: body.actor,
                field_path: body.field_path,
                filename: body.filename,
                mime_type: body.mime_type,
                size_bytes: body.size_bytes,
            })
            .await,
    )?;
    Ok(ok(reply))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBody {
    pub resume_token: String,
    pub actor: Actor,
}

/// POST /intake/{intakeId}/submissions/{id}/uploads/{uploadId}/confirm
#[instrument(skip(state, body))]
pub async fn confirm(
    State(state): State<AppState>,
    Path((_intake_id, id, upload_id)): Path<(String, String, String)>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<Json<ApiOk<ConfirmUploadReply>>> {
    let reply = into_reply(
        state
            .manager
            .confirm_upload(ConfirmUpload {
                submission_id: SubmissionId::from_string(id),
                resume_token: body.resume_token,
                upload_id: UploadId::from_string(upload_id),
                actor: body.actor,
            })
            .await,
    )?;
    Ok(ok(reply))
}

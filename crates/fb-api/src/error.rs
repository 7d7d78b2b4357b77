//! HTTP error mapping
//!
//! Two channels, mirroring the engine: structured refusals serialize as
//! `{ok:false, …}` envelopes with a status from the taxonomy; thrown
//! errors log their full detail and surface a bare `internal_error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use fb_domain::{ErrorEnvelope, ErrorType, Outcome};
use fb_engine::{EngineError, OpResult};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Protocol refusal; travels to the caller as-is.
    Refused(ErrorEnvelope),
    /// Malformed transport input (bad query params, unknown enums).
    BadRequest { message: String },
    /// Thrown engine error; detail stays in the log.
    Internal(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Internal(e)
    }
}

/// Collapse an engine outcome into the handler result shape.
pub fn into_reply<T>(result: OpResult<T>) -> ApiResult<T> {
    match result {
        Ok(Outcome::Accepted(value)) => Ok(value),
        Ok(Outcome::Refused(envelope)) => Err(ApiError::Refused(envelope)),
        Err(e) => Err(ApiError::Internal(e)),
    }
}

pub fn status_for(error_type: ErrorType) -> StatusCode {
    match error_type {
        ErrorType::Missing
        | ErrorType::Invalid
        | ErrorType::InvalidRequest
        | ErrorType::ValidationError => StatusCode::BAD_REQUEST,
        ErrorType::InvalidResumeToken | ErrorType::Expired => StatusCode::FORBIDDEN,
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::Conflict
        | ErrorType::NeedsApproval
        | ErrorType::Cancelled
        | ErrorType::UploadPending => StatusCode::CONFLICT,
        ErrorType::DeliveryFailed | ErrorType::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Serialize)]
struct FailureBody {
    ok: bool,
    #[serde(flatten)]
    envelope: ErrorEnvelope,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, envelope) = match self {
            ApiError::Refused(envelope) => (status_for(envelope.error.error_type), envelope),
            ApiError::BadRequest { message } => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new(ErrorType::InvalidRequest, message),
            ),
            ApiError::Internal(e) => {
                // Full detail to the structured log, none to the caller.
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorEnvelope::new(ErrorType::InternalError, "internal error"),
                )
            }
        };

        let body = FailureBody {
            ok: false,
            envelope,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_the_documented_statuses() {
        assert_eq!(status_for(ErrorType::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorType::InvalidResumeToken), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorType::Expired), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorType::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorType::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorType::NeedsApproval), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorType::InternalError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

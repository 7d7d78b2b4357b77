//! Event stream routes

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use fb_domain::{ActorKind, Event, EventFilter, EventType, SubmissionId};
use fb_engine::ExportFormat;

use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ApiOk};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Comma-separated event type names.
    #[serde(rename = "type")]
    pub types: Option<String>,
    pub actor_kind: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn build_filter(query: &EventsQuery) -> Result<EventFilter, ApiError> {
    let types = match &query.types {
        None => None,
        Some(raw) => {
            let mut parsed = Vec::new();
            for name in raw.split(',').filter(|s| !s.is_empty()) {
                match EventType::parse(name) {
                    Some(event_type) => parsed.push(event_type),
                    None => {
                        return Err(ApiError::BadRequest {
                            message: format!("unknown event type `{name}`"),
                        })
                    }
                }
            }
            Some(parsed)
        }
    };

    let actor_kind = match &query.actor_kind {
        None => None,
        Some(raw) => match ActorKind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                return Err(ApiError::BadRequest {
                    message: format!("unknown actor kind `{raw}`"),
                })
            }
        },
    };

    Ok(EventFilter {
        types,
        actor_kind,
        since: query.since,
        until: query.until,
        limit: query.limit,
        offset: query.offset,
    })
}

#[derive(serde::Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub total: usize,
}

/// GET /submissions/{id}/events
#[instrument(skip(state, query))]
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<ApiOk<EventsResponse>>> {
    let filter = build_filter(&query)?;
    let events = state
        .event_log
        .list(&SubmissionId::from_string(id), &filter)
        .await
        .map_err(fb_engine::EngineError::from)?;
    Ok(ok(EventsResponse {
        total: events.len(),
        events,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub format: Option<String>,
    #[serde(rename = "type")]
    pub types: Option<String>,
    pub actor_kind: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /submissions/{id}/events/export?format=jsonl|json
#[instrument(skip(state, query))]
pub async fn export(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    let format = match query.format.as_deref() {
        None => ExportFormat::Json,
        Some(raw) => ExportFormat::parse(raw).ok_or_else(|| ApiError::BadRequest {
            message: format!("unknown export format `{raw}`"),
        })?,
    };
    let filter = build_filter(&EventsQuery {
        types: query.types,
        actor_kind: query.actor_kind,
        since: query.since,
        until: query.until,
        limit: query.limit,
        offset: query.offset,
    })?;

    let bytes = state
        .event_log
        .export(&SubmissionId::from_string(id), format, &filter)
        .await
        .map_err(fb_engine::EngineError::from)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        bytes,
    ))
}

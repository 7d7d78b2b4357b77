//! Route handlers

pub mod approvals;
pub mod events;
pub mod handoff;
pub mod submissions;
pub mod uploads;

use axum::Json;
use serde::Serialize;

/// Success envelope: `{ok: true, …body}`.
#[derive(Serialize)]
pub struct ApiOk<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn ok<T: Serialize>(body: T) -> Json<ApiOk<T>> {
    Json(ApiOk { ok: true, body })
}

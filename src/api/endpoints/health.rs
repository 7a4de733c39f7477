//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::models::enums::Shift;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub grace_minutes: u32,
    /// Shift on duty at the facility right now.
    pub current_shift: Option<Shift>,
}

/// `GET /api/health`: liveness check.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let config = ctx.core.config();
    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        grace_minutes: config.grace_minutes,
        current_shift: config.shift_policy.shift_at(local_now().time()),
    }))
}

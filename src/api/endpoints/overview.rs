//! Admin overview endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::DirectoryCounts;
use crate::directory;

/// `GET /api/overview`: directory counts for the admin dashboard.
pub async fn counts(State(ctx): State<ApiContext>) -> Result<Json<DirectoryCounts>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(directory::overview(&conn)?))
}

//! Staff directory endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::directory::{self, NewStaff};
use crate::models::enums::AccountStatus;
use crate::models::Staff;

/// `POST /api/staff`
pub async fn register(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewStaff>, JsonRejection>,
) -> Result<(StatusCode, Json<Staff>), ApiError> {
    let Json(input) = body?;
    let conn = ctx.core.open_db()?;
    let staff = directory::register_staff(&conn, &input, local_now())?;
    Ok((StatusCode::CREATED, Json(staff)))
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: AccountStatus,
}

/// `PUT /api/staff/:id/status`
pub async fn status(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<Staff>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let conn = ctx.core.open_db()?;
    Ok(Json(directory::set_staff_status(&conn, &id, body.status)?))
}

//! Patient-doctor link request endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::models::LinkRequest;
use crate::patients;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLinkRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
}

/// `POST /api/link-requests`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewLinkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LinkRequest>), ApiError> {
    let Json(body) = body?;
    let conn = ctx.core.open_db()?;
    let request = patients::request_link(&conn, &body.patient_id, &body.doctor_id, local_now())?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub doctor_id: Uuid,
}

/// `POST /api/link-requests/:id/accept`
pub async fn accept(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionBody>, JsonRejection>,
) -> Result<Json<LinkRequest>, ApiError> {
    decide(ctx, id, body, true)
}

/// `POST /api/link-requests/:id/reject`
pub async fn reject(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionBody>, JsonRejection>,
) -> Result<Json<LinkRequest>, ApiError> {
    decide(ctx, id, body, false)
}

fn decide(
    ctx: ApiContext,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionBody>, JsonRejection>,
    accept: bool,
) -> Result<Json<LinkRequest>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let mut conn = ctx.core.open_db()?;
    let request = patients::decide_link_request(&mut conn, &id, &body.doctor_id, accept, local_now())?;
    Ok(Json(request))
}

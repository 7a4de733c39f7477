//! Care coverage endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::models::enums::Shift;
use crate::models::CoverageAssignment;
use crate::patients;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub patient_id: Uuid,
    pub shift: Shift,
    pub staff_id: Uuid,
}

/// `PUT /api/care-coverage`: assign or replace a shift's staff member.
pub async fn assign(
    State(ctx): State<ApiContext>,
    body: Result<Json<AssignBody>, JsonRejection>,
) -> Result<Json<CoverageAssignment>, ApiError> {
    let Json(body) = body?;
    let assignment = patients::cover_shift(&ctx.core, &body.patient_id, body.shift, &body.staff_id, local_now())?;
    Ok(Json(assignment))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftQuery {
    pub patient_id: Uuid,
    pub shift: Shift,
}

/// `DELETE /api/care-coverage?patientId&shift`
pub async fn remove(
    State(ctx): State<ApiContext>,
    query: Result<Query<ShiftQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(query) = query?;
    patients::uncover_shift(&ctx.core, &query.patient_id, query.shift)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientQuery {
    pub patient_id: Uuid,
}

/// `GET /api/care-coverage?patientId`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> Result<Json<Vec<CoverageAssignment>>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::list_coverage(&conn, &query.patient_id)?))
}

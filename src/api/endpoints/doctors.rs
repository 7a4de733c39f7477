//! Doctor directory and dashboard endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::adherence::{self, PatientAdherence};
use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::directory::{self, NewDoctor};
use crate::models::{Doctor, LinkRequest};
use crate::patients;

/// `POST /api/doctors`: register, pending approval.
pub async fn register(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewDoctor>, JsonRejection>,
) -> Result<(StatusCode, Json<Doctor>), ApiError> {
    let Json(input) = body?;
    let conn = ctx.core.open_db()?;
    let doctor = directory::register_doctor(&conn, &input, local_now())?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

/// `POST /api/doctors/:id/approve`
pub async fn approve(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Doctor>, ApiError> {
    let Path(id) = id?;
    let conn = ctx.core.open_db()?;
    Ok(Json(directory::approve_doctor(&conn, &id)?))
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// `GET /api/doctors/:id/patients?start&end`: linked patients with adherence.
pub async fn patient_overview(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> Result<Json<Vec<PatientAdherence>>, ApiError> {
    let Path(id) = id?;
    let Query(range) = query?;
    let conn = ctx.core.open_db()?;
    let overview = adherence::doctor_patient_overview(&conn, &id, range.start, range.end)?;
    Ok(Json(overview))
}

/// `GET /api/doctors/:id/link-requests`: pending requests addressed to the doctor.
pub async fn link_requests(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<LinkRequest>>, ApiError> {
    let Path(id) = id?;
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::pending_requests(&conn, &id)?))
}

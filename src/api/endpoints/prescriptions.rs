//! Prescription endpoints.
//!
//! - `POST /api/prescriptions`: create and materialize the first horizon
//! - `GET /api/prescriptions?patientId&status`: list for a patient
//! - `GET /api/prescriptions/:id`: detail
//! - `POST /api/prescriptions/:id/cancel`: cancel by the prescribing doctor

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::models::enums::PrescriptionStatus;
use crate::models::Prescription;
use crate::prescriptions::{self, NewPrescription};

/// `POST /api/prescriptions`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewPrescription>, JsonRejection>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    let Json(input) = body?;
    let prescription = prescriptions::create(&ctx.core, &input, local_now())?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub patient_id: Uuid,
    pub status: Option<PrescriptionStatus>,
}

/// `GET /api/prescriptions?patientId&status`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let list = prescriptions::list_for_patient(&conn, &query.patient_id, query.status)?;
    Ok(Json(list))
}

/// `GET /api/prescriptions/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Prescription>, ApiError> {
    let Path(id) = id?;
    let conn = ctx.core.open_db()?;
    Ok(Json(prescriptions::get_prescription(&conn, &id)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBody {
    pub doctor_id: Uuid,
}

/// `POST /api/prescriptions/:id/cancel`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CancelBody>, JsonRejection>,
) -> Result<Json<Prescription>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let prescription = prescriptions::cancel(&ctx.core, &id, &body.doctor_id, local_now())?;
    Ok(Json(prescription))
}

//! Patient endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::models::enums::PatientCondition;
use crate::models::{Caretaker, Patient};
use crate::patients::{self, NewPatient};

/// `POST /api/patients`
pub async fn register(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewPatient>, JsonRejection>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let Json(input) = body?;
    let conn = ctx.core.open_db()?;
    let patient = patients::register_patient(&conn, &input, local_now())?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = id?;
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::get_patient(&conn, &id)?))
}

/// `PUT /api/patients/:id/caretaker`
pub async fn caretaker(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<Caretaker>, JsonRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = id?;
    let Json(caretaker) = body?;
    Ok(Json(patients::change_caretaker(&ctx.core, &id, caretaker)?))
}

#[derive(Deserialize)]
pub struct ConditionBody {
    pub condition: PatientCondition,
}

/// `PUT /api/patients/:id/condition`
pub async fn condition(
    State(ctx): State<ApiContext>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ConditionBody>, JsonRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(patients::change_condition(&ctx.core, &id, body.condition)?))
}

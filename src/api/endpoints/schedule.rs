//! Day schedule endpoint for the patient and staff dashboards.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_today, ApiContext};
use crate::models::ScheduleRow;
use crate::schedule;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuery {
    pub patient_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

/// `GET /api/today-schedule?patientId|staffId&date`
///
/// Exactly one of `patientId` and `staffId` must be given.
pub async fn today(
    State(ctx): State<ApiContext>,
    query: Result<Query<ScheduleQuery>, QueryRejection>,
) -> Result<Json<Vec<ScheduleRow>>, ApiError> {
    let Query(query) = query?;
    let date = query.date.unwrap_or_else(local_today);
    let conn = ctx.core.open_db()?;

    let rows = match (query.patient_id, query.staff_id) {
        (Some(patient_id), None) => schedule::patient_schedule(&conn, &patient_id, &date)?,
        (None, Some(staff_id)) => {
            schedule::staff_schedule(&conn, &ctx.core.config().shift_policy, &staff_id, &date)?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of patientId and staffId is required".into(),
            ))
        }
    };
    Ok(Json(rows))
}

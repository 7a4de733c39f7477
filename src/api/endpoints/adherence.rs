//! Adherence report endpoint.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adherence::{self, AdherenceSnapshot, AdherenceSummary};
use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceQuery {
    pub patient_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceResponse {
    pub patient_id: Uuid,
    pub snapshots: Vec<AdherenceSnapshot>,
    pub summary: AdherenceSummary,
}

/// `GET /api/adherence?patientId&start&end`: day snapshots plus range summary.
pub async fn report(
    State(ctx): State<ApiContext>,
    query: Result<Query<AdherenceQuery>, QueryRejection>,
) -> Result<Json<AdherenceResponse>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let snapshots = adherence::aggregate_range(&conn, &query.patient_id, query.start, query.end)?;
    let summary = adherence::summarize(&snapshots);
    Ok(Json(AdherenceResponse {
        patient_id: query.patient_id,
        snapshots,
        summary,
    }))
}

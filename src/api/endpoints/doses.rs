//! Dose marking endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{local_now, ApiContext};
use crate::models::DoseInstance;
use crate::schedule::{self, MarkRequest};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkDoseBody {
    pub dose_id: Uuid,
    pub actor_id: Uuid,
    /// Defaults to the server clock.
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

/// `POST /api/mark-dose`: record a dose as taken.
pub async fn mark(
    State(ctx): State<ApiContext>,
    body: Result<Json<MarkDoseBody>, JsonRejection>,
) -> Result<Json<DoseInstance>, ApiError> {
    let Json(body) = body?;
    let request = MarkRequest {
        dose_id: body.dose_id,
        actor_id: body.actor_id,
        at: body.timestamp.unwrap_or_else(local_now),
    };
    let dose = schedule::mark(&ctx.core, &request)?;
    Ok(Json(dose))
}

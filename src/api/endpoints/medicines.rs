//! Medicine catalog endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::directory;
use crate::models::Medicine;

#[derive(Deserialize)]
pub struct NewMedicine {
    pub name: String,
}

/// `POST /api/medicines`
pub async fn add(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewMedicine>, JsonRejection>,
) -> Result<(StatusCode, Json<Medicine>), ApiError> {
    let Json(body) = body?;
    let conn = ctx.core.open_db()?;
    let medicine = directory::add_medicine(&conn, &body.name)?;
    Ok((StatusCode::CREATED, Json(medicine)))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// `GET /api/medicines?search`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<Medicine>>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    Ok(Json(directory::list_medicines(&conn, query.search.as_deref())?))
}

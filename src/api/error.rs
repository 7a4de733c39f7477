//! API error types with structured JSON responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::adherence::AdherenceError;
use crate::core_state::CoreError;
use crate::coverage::CoverageError;
use crate::db::DatabaseError;
use crate::directory::DirectoryError;
use crate::patients::PatientError;
use crate::prescriptions::PrescriptionError;
use crate::schedule::{CalendarError, ScheduleError};

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    AlreadyResolved(String),
    #[error("{0}")]
    OutsideMarkableWindow(String),
    #[error("{0}")]
    NoCoverageAssigned(String),
    #[error("{0}")]
    IncompleteCoverage(String),
    #[error("{0}")]
    InvalidRecurrence(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_)
            | ApiError::AlreadyResolved(_)
            | ApiError::OutsideMarkableWindow(_)
            | ApiError::NoCoverageAssigned(_)
            | ApiError::IncompleteCoverage(_) => StatusCode::CONFLICT,
            ApiError::InvalidRecurrence(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            ApiError::OutsideMarkableWindow(_) => "OUTSIDE_MARKABLE_WINDOW",
            ApiError::NoCoverageAssigned(_) => "NO_COVERAGE_ASSIGNED",
            ApiError::IncompleteCoverage(_) => "INCOMPLETE_COVERAGE",
            ApiError::InvalidRecurrence(_) => "INVALID_RECURRENCE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "API internal error");
                "An internal error occurred".to_string()
            }
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Forbidden(m)
            | ApiError::Conflict(m)
            | ApiError::AlreadyResolved(m)
            | ApiError::OutsideMarkableWindow(m)
            | ApiError::NoCoverageAssigned(m)
            | ApiError::IncompleteCoverage(m)
            | ApiError::InvalidRecurrence(m) => m,
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════
// Conversions from engine errors
// ═══════════════════════════════════════════════════════════

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} not found: {id}"))
            }
            other if other.is_constraint_violation() => ApiError::Conflict(other.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::InvalidRecurrence(_) => ApiError::InvalidRecurrence(err.to_string()),
            CalendarError::Database(e) => e.into(),
        }
    }
}

impl From<CoverageError> for ApiError {
    fn from(err: CoverageError) -> Self {
        match err {
            CoverageError::NoCoverageAssigned { .. } => ApiError::NoCoverageAssigned(err.to_string()),
            CoverageError::InvalidPolicy(_) => ApiError::Internal(err.to_string()),
            CoverageError::Database(e) => e.into(),
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ScheduleError::AlreadyResolved { .. } => ApiError::AlreadyResolved(err.to_string()),
            ScheduleError::Forbidden { .. } => ApiError::Forbidden(err.to_string()),
            ScheduleError::OutsideMarkableWindow { .. } => {
                ApiError::OutsideMarkableWindow(err.to_string())
            }
            ScheduleError::Calendar(e) => e.into(),
            ScheduleError::Coverage(e) => e.into(),
            ScheduleError::Database(e) => e.into(),
            ScheduleError::Core(e) => e.into(),
        }
    }
}

impl From<PatientError> for ApiError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PatientError::Validation(m) => ApiError::BadRequest(m),
            PatientError::IncompleteCoverage { .. } => ApiError::IncompleteCoverage(err.to_string()),
            PatientError::Forbidden(m) => ApiError::Forbidden(m),
            PatientError::Conflict(m) => ApiError::Conflict(m),
            PatientError::Coverage(e) => e.into(),
            PatientError::Database(e) => e.into(),
            PatientError::Core(e) => e.into(),
        }
    }
}

impl From<PrescriptionError> for ApiError {
    fn from(err: PrescriptionError) -> Self {
        match err {
            PrescriptionError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PrescriptionError::Forbidden(m) => ApiError::Forbidden(m),
            PrescriptionError::Validation(m) => ApiError::BadRequest(m),
            PrescriptionError::Conflict(m) => ApiError::Conflict(m),
            PrescriptionError::Calendar(e) => e.into(),
            PrescriptionError::Database(e) => e.into(),
            PrescriptionError::Core(e) => e.into(),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DirectoryError::Validation(m) => ApiError::BadRequest(m),
            DirectoryError::Conflict(m) => ApiError::Conflict(m),
            DirectoryError::Database(e) => e.into(),
        }
    }
}

impl From<AdherenceError> for ApiError {
    fn from(err: AdherenceError) -> Self {
        match err {
            AdherenceError::InvalidRange { .. } | AdherenceError::RangeTooLong { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            AdherenceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            AdherenceError::Database(e) => e.into(),
        }
    }
}

// ── Extractor rejections ────────────────────────────────────

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::NaiveDate;
    use uuid::Uuid;

    use crate::models::enums::Shift;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("disk I/O error".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn already_resolved_is_conflict_with_own_code() {
        let err: ApiError = ScheduleError::AlreadyResolved { dose_id: Uuid::nil() }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "ALREADY_RESOLVED");
    }

    #[tokio::test]
    async fn invalid_recurrence_is_unprocessable() {
        let err: ApiError = PrescriptionError::Calendar(CalendarError::InvalidRecurrence(
            "no time slots".into(),
        ))
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "INVALID_RECURRENCE");
    }

    #[test]
    fn missing_coverage_maps_through_schedule_error() {
        let err: ApiError = ScheduleError::Coverage(CoverageError::NoCoverageAssigned {
            patient_id: Uuid::nil(),
            shift: Shift::Night,
        })
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "NO_COVERAGE_ASSIGNED");
    }

    #[test]
    fn incomplete_coverage_and_forbidden_codes() {
        let err: ApiError = PatientError::IncompleteCoverage {
            missing: vec![Shift::Evening],
        }
        .into();
        assert_eq!(err.code(), "INCOMPLETE_COVERAGE");

        let err: ApiError = PrescriptionError::Forbidden("not the prescriber".into()).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn database_not_found_is_404() {
        let err: ApiError = DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: "x".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn inverted_range_is_bad_request() {
        let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
        let err: ApiError = AdherenceError::InvalidRange {
            start: day(5),
            end: day(1),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = AdherenceError::RangeTooLong {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        }
        .into();
        assert_eq!(err.code(), "BAD_REQUEST");
    }
}

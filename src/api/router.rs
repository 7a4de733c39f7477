//! HTTP router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! CORS → `Cache-Control: no-store` → Extension(ApiContext) → Audit logger

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected outside the audit layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/mark-dose", post(endpoints::doses::mark))
        .route(
            "/prescriptions",
            post(endpoints::prescriptions::create).get(endpoints::prescriptions::list),
        )
        .route("/prescriptions/:id", get(endpoints::prescriptions::detail))
        .route(
            "/prescriptions/:id/cancel",
            post(endpoints::prescriptions::cancel),
        )
        .route(
            "/care-coverage",
            put(endpoints::coverage::assign)
                .delete(endpoints::coverage::remove)
                .get(endpoints::coverage::list),
        )
        .route("/adherence", get(endpoints::adherence::report))
        .route("/today-schedule", get(endpoints::schedule::today))
        .route("/patients", post(endpoints::patients::register))
        .route("/patients/:id", get(endpoints::patients::detail))
        .route("/patients/:id/caretaker", put(endpoints::patients::caretaker))
        .route("/patients/:id/condition", put(endpoints::patients::condition))
        .route("/doctors", post(endpoints::doctors::register))
        .route("/doctors/:id/approve", post(endpoints::doctors::approve))
        .route("/doctors/:id/patients", get(endpoints::doctors::patient_overview))
        .route(
            "/doctors/:id/link-requests",
            get(endpoints::doctors::link_requests),
        )
        .route("/link-requests", post(endpoints::link_requests::create))
        .route(
            "/link-requests/:id/accept",
            post(endpoints::link_requests::accept),
        )
        .route(
            "/link-requests/:id/reject",
            post(endpoints::link_requests::reject),
        )
        .route("/staff", post(endpoints::staff::register))
        .route("/staff/:id/status", put(endpoints::staff::status))
        .route(
            "/medicines",
            post(endpoints::medicines::add).get(endpoints::medicines::list),
        )
        .route("/overview", get(endpoints::overview::counts))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        // Extension must wrap the audit layer so it can extract ApiContext
        .layer(axum::Extension(ctx));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", routes)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}

//! Audit logging middleware.
//!
//! Every request is traced; state-changing requests are also written to the
//! audit log with their response status.

use axum::extract::OriginalUri;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::ApiContext;
use crate::core_state::AccessSource;

/// Log API access for audit trail.
/// Accesses `ApiContext` from request extensions.
pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    // Inside `nest` the URI is stripped of its prefix.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let ctx = req.extensions().get::<ApiContext>().cloned();

    let response = next.run(req).await;
    let status = response.status().as_u16();

    tracing::debug!(%method, path = %path, status, "API request");

    if method != Method::GET {
        if let Some(ctx) = ctx {
            ctx.core.log_access(
                AccessSource::Api,
                &format!("{method} {path}"),
                &format!("status:{status}"),
                None,
            );
        }
    }

    response
}

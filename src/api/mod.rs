//! HTTP API.
//!
//! Exposes the engine as JSON endpoints for the web frontend. Routes are
//! nested under `/api/`; `api_router()` returns a composable `Router` and
//! `start_api_server()` serves it on the configured address.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;

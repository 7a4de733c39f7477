//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. CORS and `Cache-Control` headers (tower-http, applied in the router)
//! 2. Audit logger

pub mod audit;

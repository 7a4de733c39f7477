//! Shared types for the HTTP layer.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::core_state::CoreState;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Facility-local wall clock.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn local_today() -> NaiveDate {
    local_now().date()
}

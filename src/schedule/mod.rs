//! Dose scheduling: slot calendar, status machine, marking and the MISSED sweep.

pub mod calendar;
pub mod marking;
pub mod status;
pub mod sweep;
pub mod view;

pub use calendar::{expand, materialize, CalendarError};
pub use marking::{mark, mark_dose, MarkRequest};
pub use status::{classify_mark, MarkTiming};
pub use sweep::{run_sweep, start_sweep_scheduler, SweepReport, SweepSchedulerHandle};
pub use view::{patient_schedule, staff_schedule};

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::core_state::CoreError;
use crate::coverage::CoverageError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Dose {dose_id} is already resolved")]
    AlreadyResolved { dose_id: Uuid },

    #[error("Actor {actor_id} may not mark dose {dose_id}")]
    Forbidden { actor_id: Uuid, dose_id: Uuid },

    #[error("Dose {dose_id} cannot be marked at {at}")]
    OutsideMarkableWindow { dose_id: Uuid, at: NaiveDateTime },

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Coverage(#[from] CoverageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

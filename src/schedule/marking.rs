//! Caretaker, staff and doctor marks on a dose.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use super::status::classify_mark;
use super::ScheduleError;
use crate::core_state::{AccessSource, CoreState};
use crate::coverage::{self, ShiftPolicy};
use crate::db;
use crate::models::enums::MarkSource;
use crate::models::DoseInstance;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    pub dose_id: Uuid,
    pub actor_id: Uuid,
    pub at: NaiveDateTime,
}

/// Mark a dose on an open connection.
///
/// Checks run in order: the dose exists, it is still PENDING, the actor may
/// mark it, and `at` falls inside the window or its grace period. The
/// PENDING → terminal write is conditional, so a concurrent writer that got
/// there first yields `AlreadyResolved`.
pub fn mark_dose(
    conn: &Connection,
    policy: &ShiftPolicy,
    grace: Duration,
    request: &MarkRequest,
) -> Result<DoseInstance, ScheduleError> {
    let dose = db::get_dose(conn, &request.dose_id)?.ok_or(ScheduleError::NotFound {
        entity_type: "dose",
        id: request.dose_id,
    })?;

    if dose.status.is_terminal() {
        return Err(ScheduleError::AlreadyResolved { dose_id: dose.id });
    }

    let source = resolve_mark_source(conn, policy, &dose, request.actor_id)?;

    let status = classify_mark(&dose.window, grace, request.at)
        .status()
        .ok_or(ScheduleError::OutsideMarkableWindow {
            dose_id: dose.id,
            at: request.at,
        })?;

    let updated = db::resolve_pending_dose(
        conn,
        &dose.id,
        status,
        Some(&request.at),
        Some(&request.actor_id),
        Some(source),
    )?;
    if !updated {
        return Err(ScheduleError::AlreadyResolved { dose_id: dose.id });
    }

    db::get_dose(conn, &dose.id)?.ok_or(ScheduleError::NotFound {
        entity_type: "dose",
        id: dose.id,
    })
}

/// The prescribing doctor may always mark. Anyone else must be the
/// authorized marker from coverage resolution.
fn resolve_mark_source(
    conn: &Connection,
    policy: &ShiftPolicy,
    dose: &DoseInstance,
    actor_id: Uuid,
) -> Result<MarkSource, ScheduleError> {
    let doctor_id = db::get_prescription_doctor_id(conn, &dose.prescription_id)?;
    if doctor_id == Some(actor_id) {
        return Ok(MarkSource::DoctorOverride);
    }

    let patient = db::require_patient(conn, &dose.patient_id)?;
    let marker = coverage::authorized_marker(conn, policy, &patient, dose)?;
    if marker.id() != actor_id {
        return Err(ScheduleError::Forbidden {
            actor_id,
            dose_id: dose.id,
        });
    }
    Ok(MarkSource::Caretaker)
}

/// Mark a dose under its patient's timeline lock.
///
/// Doctor overrides are written to the audit log.
pub fn mark(core: &CoreState, request: &MarkRequest) -> Result<DoseInstance, ScheduleError> {
    let patient_id = {
        let conn = core.open_db()?;
        db::get_dose_patient_id(&conn, &request.dose_id)?.ok_or(ScheduleError::NotFound {
            entity_type: "dose",
            id: request.dose_id,
        })?
    };

    let config = core.config();
    let dose = core.with_patient_timeline(&patient_id, |conn| {
        mark_dose(conn, &config.shift_policy, config.grace(), request)
    })?;

    tracing::info!(
        dose_id = %dose.id,
        status = %dose.status,
        source = ?dose.mark_source,
        "Dose marked"
    );
    if dose.mark_source == Some(MarkSource::DoctorOverride) {
        core.log_access(
            AccessSource::Actor(request.actor_id),
            "dose.doctor_override",
            &format!("dose:{}", dose.id),
            Some(patient_id),
        );
    }
    Ok(dose)
}

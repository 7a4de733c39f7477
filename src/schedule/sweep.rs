//! Periodic MISSED sweep and prescription roll-forward.
//!
//! One pass:
//! 1. every PENDING dose with `window_end + grace <= now` becomes MISSED;
//! 2. ACTIVE prescriptions whose courses have all elapsed are filled in to
//!    their last day, and become COMPLETED once no dose is left PENDING;
//! 3. remaining ACTIVE prescriptions are materialized up to the horizon.
//!
//! Failures are isolated per dose and per prescription: they are logged,
//! counted, and the pass continues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::calendar::materialize;
use super::status::missed_cutoff;
use super::ScheduleError;
use crate::core_state::{AccessSource, CoreState};
use crate::db;
use crate::models::enums::{DoseStatus, PrescriptionStatus};
use crate::models::Prescription;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY_SECS: u64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Overdue PENDING doses found.
    pub examined: usize,
    pub missed: usize,
    pub failed: usize,
    pub prescriptions_completed: usize,
    pub doses_materialized: usize,
}

/// Run one sweep pass as of `now` (facility-local time).
pub fn run_sweep(core: &CoreState, now: NaiveDateTime) -> Result<SweepReport, ScheduleError> {
    let config = core.config();
    let mut report = SweepReport::default();

    let (overdue, active) = {
        let conn = core.open_db()?;
        let overdue = db::list_pending_closed_before(&conn, &missed_cutoff(now, config.grace()))?;
        let active = db::list_prescriptions_by_status(&conn, PrescriptionStatus::Active)?;
        (overdue, active)
    };
    report.examined = overdue.len();

    for (dose_id, patient_id) in overdue {
        let outcome = core.with_patient_timeline(&patient_id, |conn| {
            db::resolve_pending_dose(conn, &dose_id, DoseStatus::Missed, None, None, None)
                .map_err(ScheduleError::from)
        });
        match outcome {
            Ok(true) => report.missed += 1,
            // Marked by someone else between the scan and the update.
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(%dose_id, %patient_id, error = %e, "Failed to mark dose missed");
                report.failed += 1;
            }
        }
    }

    for prescription in &active {
        match roll_forward(core, prescription, now, config.schedule_horizon_days) {
            Ok(Progress::Completed) => {
                report.prescriptions_completed += 1;
                core.log_access(
                    AccessSource::Scheduler,
                    "prescription.completed",
                    &format!("prescription:{}", prescription.id),
                    Some(prescription.patient_id),
                );
            }
            Ok(Progress::Materialized(n)) => report.doses_materialized += n,
            Err(e) => {
                tracing::warn!(
                    prescription_id = %prescription.id,
                    error = %e,
                    "Failed to roll prescription forward"
                );
                report.failed += 1;
            }
        }
    }

    if report.missed > 0 || report.prescriptions_completed > 0 || report.failed > 0 {
        tracing::info!(
            missed = report.missed,
            completed = report.prescriptions_completed,
            materialized = report.doses_materialized,
            failed = report.failed,
            "Sweep pass finished"
        );
    } else {
        tracing::debug!(materialized = report.doses_materialized, "Sweep pass finished");
    }
    Ok(report)
}

enum Progress {
    Completed,
    Materialized(usize),
}

fn roll_forward(
    core: &CoreState,
    prescription: &Prescription,
    now: NaiveDateTime,
    horizon_days: u32,
) -> Result<Progress, ScheduleError> {
    core.with_patient_timeline(&prescription.patient_id, |conn| {
        // The scan ran unlocked; a cancel may have landed since.
        let Some(current) = db::get_prescription(conn, &prescription.id)?
            .filter(|p| p.status == PrescriptionStatus::Active)
        else {
            return Ok(Progress::Materialized(0));
        };

        if now.date() >= current.end_date() {
            // Days never expanded (sweep downtime) still owe their doses.
            let filled = materialize(conn, &current, current.end_date(), 0)?;
            if filled > 0 || db::count_pending_doses_for_prescription(conn, &current.id)? > 0 {
                return Ok(Progress::Materialized(filled));
            }
            db::transition_prescription(
                conn,
                &current.id,
                PrescriptionStatus::Active,
                PrescriptionStatus::Completed,
                &now,
            )?;
            return Ok(Progress::Completed);
        }
        let inserted = materialize(conn, &current, now.date(), horizon_days)?;
        Ok(Progress::Materialized(inserted))
    })
}

// ═══════════════════════════════════════════
// Background scheduler
// ═══════════════════════════════════════════

/// Handle for the background sweep thread.
///
/// Shuts down and joins on `Drop`.
pub struct SweepSchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SweepSchedulerHandle {
    /// Request shutdown. A pass already running completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for SweepSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the sweep on a dedicated thread, running once immediately and then
/// every `sweep_interval_secs`.
pub fn start_sweep_scheduler(core: Arc<CoreState>) -> SweepSchedulerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(
            "Sweep scheduler started (every {}s)",
            core.config().sweep_interval_secs
        );
        scheduler_loop(&core, &flag);
    });

    SweepSchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn scheduler_loop(core: &CoreState, shutdown: &AtomicBool) {
    let interval = core.config().sweep_interval_secs.max(SLEEP_GRANULARITY_SECS);

    while !shutdown.load(Ordering::Relaxed) {
        let now = chrono::Local::now().naive_local();
        if let Err(e) = run_sweep(core, now) {
            tracing::warn!(error = %e, "Sweep pass aborted");
        }

        for _ in 0..(interval / SLEEP_GRANULARITY_SECS) {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(StdDuration::from_secs(SLEEP_GRANULARITY_SECS));
        }
    }
    tracing::info!("Sweep scheduler shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{MealRelation, Slot};
    use crate::models::TimeSlotRule;
    use crate::test_support::*;
    use chrono::NaiveTime;

    fn seeded(days: i32, slots: &[Slot]) -> (tempfile::TempDir, CoreState, Fixture) {
        let (dir, core) = test_core();
        let fx = {
            let conn = core.open_db().unwrap();
            let fx = seed_prescription(&conn, day(1), days, slots);
            materialize(&conn, &fx.prescription, day(1), 7).unwrap();
            fx
        };
        (dir, core, fx)
    }

    #[test]
    fn unmarked_night_dose_missed_after_grace() {
        let (_dir, core, fx) = seeded(7, &[Slot::Morning, Slot::Night]);

        // Day-1 MORNING marked on time.
        let morning = {
            let conn = core.open_db().unwrap();
            db::list_doses_for_patient_on(&conn, &fx.patient.id, &day(1)).unwrap()[0].clone()
        };
        crate::schedule::mark(
            &core,
            &crate::schedule::MarkRequest {
                dose_id: morning.id,
                actor_id: fx.patient.id,
                at: at(1, 8, 15),
            },
        )
        .unwrap();

        // Just before 22:00 + 120 min nothing is overdue for the night slot.
        let early = run_sweep(&core, at(1, 23, 59)).unwrap();
        assert_eq!(early.missed, 0);

        let report = run_sweep(&core, at(2, 0, 0)).unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.missed, 1);
        assert_eq!(report.failed, 0);

        let conn = core.open_db().unwrap();
        let doses = db::list_doses_for_patient_on(&conn, &fx.patient.id, &day(1)).unwrap();
        assert_eq!(doses[0].status, DoseStatus::OnTime);
        assert_eq!(doses[1].slot, Slot::Night);
        assert_eq!(doses[1].status, DoseStatus::Missed);
        assert_eq!(doses[1].marked_at, None);
        assert_eq!(doses[1].marked_by, None);
        assert_eq!(doses[1].mark_source, None);
    }

    #[test]
    fn second_pass_at_same_instant_changes_nothing() {
        let (_dir, core, fx) = seeded(3, &[Slot::Morning, Slot::Afternoon, Slot::Night]);

        let now = at(3, 12, 0);
        let first = run_sweep(&core, now).unwrap();
        assert!(first.missed > 0);

        let snapshot = {
            let conn = core.open_db().unwrap();
            db::list_doses_for_prescription(&conn, &fx.prescription.id).unwrap()
        };

        let second = run_sweep(&core, now).unwrap();
        assert_eq!(second.examined, 0);
        assert_eq!(second.missed, 0);
        assert_eq!(second.doses_materialized, 0);
        assert_eq!(second.prescriptions_completed, 0);

        let conn = core.open_db().unwrap();
        let after = db::list_doses_for_prescription(&conn, &fx.prescription.id).unwrap();
        let statuses = |v: &[crate::models::DoseInstance]| {
            v.iter().map(|d| (d.id, d.status)).collect::<Vec<_>>()
        };
        assert_eq!(statuses(&snapshot), statuses(&after));
    }

    #[test]
    fn elapsed_prescription_completes() {
        let (_dir, core, fx) = seeded(2, &[Slot::Morning]);

        let report = run_sweep(&core, at(3, 0, 0)).unwrap();
        assert_eq!(report.prescriptions_completed, 1);
        assert_eq!(report.missed, 2);

        let conn = core.open_db().unwrap();
        let p = db::get_prescription(&conn, &fx.prescription.id).unwrap().unwrap();
        assert_eq!(p.status, PrescriptionStatus::Completed);
        assert_eq!(p.closed_at, Some(at(3, 0, 0)));

        let audit = core.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].source, AccessSource::Scheduler);
        assert_eq!(audit[0].action, "prescription.completed");
    }

    #[test]
    fn downtime_past_course_end_backfills_before_completing() {
        let (_dir, core, fx) = seeded(20, &[Slot::Morning]);

        let first = run_sweep(&core, at(25, 12, 0)).unwrap();
        assert_eq!(first.missed, 8);
        assert_eq!(first.doses_materialized, 12);
        assert_eq!(first.prescriptions_completed, 0);
        {
            let conn = core.open_db().unwrap();
            let p = db::get_prescription(&conn, &fx.prescription.id).unwrap().unwrap();
            assert_eq!(p.status, PrescriptionStatus::Active);
            assert_eq!(db::list_doses_for_prescription(&conn, &fx.prescription.id).unwrap().len(), 20);
        }

        let second = run_sweep(&core, at(25, 12, 0)).unwrap();
        assert_eq!(second.missed, 12);
        assert_eq!(second.prescriptions_completed, 1);

        let conn = core.open_db().unwrap();
        let doses = db::list_doses_for_prescription(&conn, &fx.prescription.id).unwrap();
        assert_eq!(doses.len(), 20);
        assert!(doses.iter().all(|d| d.status == DoseStatus::Missed));
        let p = db::get_prescription(&conn, &fx.prescription.id).unwrap().unwrap();
        assert_eq!(p.status, PrescriptionStatus::Completed);
    }

    #[test]
    fn late_window_keeps_prescription_active_until_swept() {
        let (_dir, core) = test_core();
        let fx = {
            let conn = core.open_db().unwrap();
            let mut rule = TimeSlotRule::with_default_window(Slot::Night, MealRelation::After);
            rule.window_end = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
            let fx = seed_prescription_with(&conn, day(1), 1, vec![rule]);
            materialize(&conn, &fx.prescription, day(1), 7).unwrap();
            fx
        };

        // Course ends at midnight, but the 23:30 dose is still within grace.
        let midnight = run_sweep(&core, at(2, 0, 0)).unwrap();
        assert_eq!(midnight.missed, 0);
        assert_eq!(midnight.prescriptions_completed, 0);
        {
            let conn = core.open_db().unwrap();
            let p = db::get_prescription(&conn, &fx.prescription.id).unwrap().unwrap();
            assert_eq!(p.status, PrescriptionStatus::Active);
        }

        let report = run_sweep(&core, at(2, 1, 30)).unwrap();
        assert_eq!(report.missed, 1);
        assert_eq!(report.prescriptions_completed, 1);
    }

    #[test]
    fn active_prescription_rolls_horizon_forward() {
        let (_dir, core, fx) = seeded(20, &[Slot::Morning]);
        {
            let conn = core.open_db().unwrap();
            assert_eq!(db::list_doses_for_prescription(&conn, &fx.prescription.id).unwrap().len(), 8);
        }

        let report = run_sweep(&core, at(3, 6, 0)).unwrap();
        assert_eq!(report.doses_materialized, 2);

        let conn = core.open_db().unwrap();
        assert_eq!(db::list_doses_for_prescription(&conn, &fx.prescription.id).unwrap().len(), 10);
    }

    #[test]
    fn cancelled_prescription_is_not_rematerialized() {
        let (_dir, core, fx) = seeded(20, &[Slot::Morning]);
        crate::prescriptions::cancel(&core, &fx.prescription.id, &fx.doctor.id, at(1, 6, 0)).unwrap();

        let report = run_sweep(&core, at(3, 6, 0)).unwrap();
        assert_eq!(report.doses_materialized, 0);
        assert_eq!(report.prescriptions_completed, 0);

        let conn = core.open_db().unwrap();
        assert!(db::list_doses_for_prescription(&conn, &fx.prescription.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn scheduler_handle_stops_on_drop() {
        let (_dir, core) = test_core();
        let handle = start_sweep_scheduler(Arc::new(core));
        handle.shutdown();
        drop(handle);
    }

    #[test]
    fn shutdown_flag_sets_atomic() {
        let handle = SweepSchedulerHandle {
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        assert!(!handle.shutdown.load(Ordering::Relaxed));
        handle.shutdown();
        assert!(handle.shutdown.load(Ordering::Relaxed));
    }
}

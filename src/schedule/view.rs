//! Day schedules for the patient and staff dashboards.

use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;

use super::ScheduleError;
use crate::coverage::ShiftPolicy;
use crate::db;
use crate::models::ScheduleRow;

/// A patient's doses for `date`, in window order.
pub fn patient_schedule(
    conn: &Connection,
    patient_id: &Uuid,
    date: &NaiveDate,
) -> Result<Vec<ScheduleRow>, ScheduleError> {
    if db::get_patient(conn, patient_id)?.is_none() {
        return Err(ScheduleError::NotFound {
            entity_type: "patient",
            id: *patient_id,
        });
    }
    Ok(db::list_schedule_rows(conn, patient_id, date)?)
}

/// Doses a staff member is responsible for on `date`: for each patient they
/// cover, the doses whose slot maps to the covered shift.
pub fn staff_schedule(
    conn: &Connection,
    policy: &ShiftPolicy,
    staff_id: &Uuid,
    date: &NaiveDate,
) -> Result<Vec<ScheduleRow>, ScheduleError> {
    if db::get_staff(conn, staff_id)?.is_none() {
        return Err(ScheduleError::NotFound {
            entity_type: "staff",
            id: *staff_id,
        });
    }

    let mut rows = Vec::new();
    for (patient_id, shift) in db::list_coverage_for_staff(conn, staff_id)? {
        for row in db::list_schedule_rows(conn, &patient_id, date)? {
            if policy.shift_for_slot(row.slot)? == shift {
                rows.push(row);
            }
        }
    }
    rows.sort_by(|a, b| {
        a.window
            .start
            .cmp(&b.window.start)
            .then_with(|| a.patient_name.cmp(&b.patient_name))
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{MealRelation, Shift, Slot};
    use crate::schedule::materialize;
    use crate::test_support::*;

    #[test]
    fn patient_schedule_joins_display_fields() {
        let conn = open_memory_database().unwrap();
        let fx = seed_prescription(&conn, day(1), 3, &[Slot::Night, Slot::Morning]);
        materialize(&conn, &fx.prescription, day(1), 7).unwrap();

        let rows = patient_schedule(&conn, &fx.patient.id, &day(2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].slot, Slot::Morning);
        assert_eq!(rows[1].slot, Slot::Night);
        assert_eq!(rows[0].medicine_name, fx.medicine.name);
        assert_eq!(rows[0].dosage, "650mg");
        assert_eq!(rows[0].patient_name, fx.patient.name);
        assert_eq!(rows[0].meal_relation, MealRelation::After);
    }

    #[test]
    fn patient_schedule_unknown_patient() {
        let conn = open_memory_database().unwrap();
        let err = patient_schedule(&conn, &Uuid::new_v4(), &day(1)).unwrap_err();
        assert!(matches!(err, ScheduleError::NotFound { entity_type: "patient", .. }));
    }

    #[test]
    fn staff_schedule_filters_by_covered_shift() {
        let conn = open_memory_database().unwrap();
        let fx = seed_prescription(&conn, day(1), 2, &[Slot::Morning, Slot::Afternoon, Slot::Night]);
        materialize(&conn, &fx.prescription, day(1), 7).unwrap();
        let staff = cover_all_shifts(&conn, &fx.patient.id);

        let evening = &staff[1];
        assert_eq!(evening.shift, Shift::Evening);
        let rows = staff_schedule(&conn, &ShiftPolicy::default(), &evening.id, &day(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slot, Slot::Afternoon);
    }

    #[test]
    fn staff_without_assignments_has_empty_schedule() {
        let conn = open_memory_database().unwrap();
        let staff = seed_staff(&conn, "Joy", Shift::Night);
        let rows = staff_schedule(&conn, &ShiftPolicy::default(), &staff.id, &day(1)).unwrap();
        assert!(rows.is_empty());
    }
}

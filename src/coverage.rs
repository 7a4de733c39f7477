//! Care coverage resolution: who may mark a patient's dose.
//!
//! Shift bands and the slot→shift mapping live in [`ShiftPolicy`], which is
//! part of the engine configuration. The resolver never assumes a mapping of
//! its own.

use chrono::{NaiveTime, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::{PatientCondition, Shift, Slot};
use crate::models::{Caretaker, DoseInstance, Patient};

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("No staff assigned to patient {patient_id} for the {shift} shift")]
    NoCoverageAssigned { patient_id: Uuid, shift: Shift },

    #[error("Invalid shift policy: {0}")]
    InvalidPolicy(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════
// Shift policy
// ═══════════════════════════════════════════

/// Hours [start_hour, end_hour) of one shift. Wraps past midnight when
/// `end_hour <= start_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftBand {
    pub shift: Shift,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl ShiftBand {
    fn covers_hour(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotShift {
    pub slot: Slot,
    pub shift: Shift,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPolicy {
    pub bands: Vec<ShiftBand>,
    pub slot_shifts: Vec<SlotShift>,
}

impl Default for ShiftPolicy {
    fn default() -> Self {
        Self {
            bands: vec![
                ShiftBand { shift: Shift::Morning, start_hour: 6, end_hour: 14 },
                ShiftBand { shift: Shift::Evening, start_hour: 14, end_hour: 22 },
                ShiftBand { shift: Shift::Night, start_hour: 22, end_hour: 6 },
            ],
            slot_shifts: vec![
                SlotShift { slot: Slot::Morning, shift: Shift::Morning },
                SlotShift { slot: Slot::Afternoon, shift: Shift::Evening },
                SlotShift { slot: Slot::Night, shift: Shift::Night },
            ],
        }
    }
}

impl ShiftPolicy {
    /// Bands must tile the day exactly once with one band per shift, and
    /// every slot must map to exactly one shift.
    pub fn validate(&self) -> Result<(), CoverageError> {
        for shift in Shift::ALL {
            let count = self.bands.iter().filter(|b| b.shift == shift).count();
            if count != 1 {
                return Err(CoverageError::InvalidPolicy(format!(
                    "shift {shift} has {count} bands, expected 1"
                )));
            }
        }

        for band in &self.bands {
            if band.start_hour > 23 || band.end_hour > 23 || band.start_hour == band.end_hour {
                return Err(CoverageError::InvalidPolicy(format!(
                    "band {}-{} for {} is not a valid hour range",
                    band.start_hour, band.end_hour, band.shift
                )));
            }
        }

        for hour in 0..24 {
            let covering = self.bands.iter().filter(|b| b.covers_hour(hour)).count();
            if covering != 1 {
                return Err(CoverageError::InvalidPolicy(format!(
                    "hour {hour:02}:00 is covered by {covering} shifts"
                )));
            }
        }

        for slot in Slot::ALL {
            let count = self.slot_shifts.iter().filter(|m| m.slot == slot).count();
            if count != 1 {
                return Err(CoverageError::InvalidPolicy(format!(
                    "slot {slot} is mapped {count} times, expected 1"
                )));
            }
        }

        Ok(())
    }

    /// Shift responsible for a slot's doses.
    pub fn shift_for_slot(&self, slot: Slot) -> Result<Shift, CoverageError> {
        self.slot_shifts
            .iter()
            .find(|m| m.slot == slot)
            .map(|m| m.shift)
            .ok_or_else(|| CoverageError::InvalidPolicy(format!("slot {slot} is not mapped")))
    }

    /// Shift on duty at a wall-clock time.
    pub fn shift_at(&self, time: NaiveTime) -> Option<Shift> {
        let hour = time.hour();
        self.bands.iter().find(|b| b.covers_hour(hour)).map(|b| b.shift)
    }
}

// ═══════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════

/// The actor allowed to mark a dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRef {
    Patient(Uuid),
    Family(Uuid),
    Staff(Uuid),
}

impl ActorRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Patient(id) | Self::Family(id) | Self::Staff(id) => *id,
        }
    }
}

/// Resolve who may mark `dose` for `patient`.
///
/// STABLE patients defer to their caretaker. CRITICAL patients, and STABLE
/// patients with a staff caretaker, defer to the staff member assigned for the
/// dose slot's shift.
pub fn authorized_marker(
    conn: &Connection,
    policy: &ShiftPolicy,
    patient: &Patient,
    dose: &DoseInstance,
) -> Result<ActorRef, CoverageError> {
    if patient.condition == PatientCondition::Stable {
        match &patient.caretaker {
            Caretaker::SelfCare => return Ok(ActorRef::Patient(patient.id)),
            Caretaker::Family { actor_id, .. } => return Ok(ActorRef::Family(*actor_id)),
            Caretaker::Staff => {}
        }
    }

    let shift = policy.shift_for_slot(dose.slot)?;
    match db::get_coverage(conn, &patient.id, shift)? {
        Some(assignment) => Ok(ActorRef::Staff(assignment.staff_id)),
        None => Err(CoverageError::NoCoverageAssigned {
            patient_id: patient.id,
            shift,
        }),
    }
}

/// Shifts with no assignment for a patient, in shift order.
pub fn missing_shifts(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Shift>, CoverageError> {
    let assigned: Vec<Shift> = db::list_coverage(conn, patient_id)?
        .into_iter()
        .map(|a| a.shift)
        .collect();
    Ok(Shift::ALL
        .into_iter()
        .filter(|s| !assigned.contains(s))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::DoseStatus;
    use crate::test_support::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dose_in(slot: Slot, patient_id: Uuid) -> DoseInstance {
        let date = day(1);
        let (start, end) = slot.default_window();
        DoseInstance {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            prescription_id: Uuid::new_v4(),
            patient_id,
            date,
            slot,
            window: crate::models::DoseWindow {
                start: date.and_time(start),
                end: date.and_time(end),
            },
            status: DoseStatus::Pending,
            marked_at: None,
            marked_by: None,
            mark_source: None,
        }
    }

    #[test]
    fn default_policy_is_valid() {
        ShiftPolicy::default().validate().unwrap();
    }

    #[test]
    fn default_slot_mapping() {
        let policy = ShiftPolicy::default();
        assert_eq!(policy.shift_for_slot(Slot::Morning).unwrap(), Shift::Morning);
        assert_eq!(policy.shift_for_slot(Slot::Afternoon).unwrap(), Shift::Evening);
        assert_eq!(policy.shift_for_slot(Slot::Night).unwrap(), Shift::Night);
    }

    #[test]
    fn shift_at_handles_wraparound() {
        let policy = ShiftPolicy::default();
        assert_eq!(policy.shift_at(hm(6, 0)), Some(Shift::Morning));
        assert_eq!(policy.shift_at(hm(13, 59)), Some(Shift::Morning));
        assert_eq!(policy.shift_at(hm(14, 0)), Some(Shift::Evening));
        assert_eq!(policy.shift_at(hm(23, 30)), Some(Shift::Night));
        assert_eq!(policy.shift_at(hm(2, 0)), Some(Shift::Night));
        assert_eq!(policy.shift_at(hm(5, 59)), Some(Shift::Night));
    }

    #[test]
    fn overlapping_bands_rejected() {
        let mut policy = ShiftPolicy::default();
        policy.bands[0].end_hour = 15;
        assert!(matches!(policy.validate(), Err(CoverageError::InvalidPolicy(_))));
    }

    #[test]
    fn gap_in_bands_rejected() {
        let mut policy = ShiftPolicy::default();
        policy.bands[1].end_hour = 21;
        assert!(matches!(policy.validate(), Err(CoverageError::InvalidPolicy(_))));
    }

    #[test]
    fn double_mapped_slot_rejected() {
        let mut policy = ShiftPolicy::default();
        policy.slot_shifts.push(SlotShift { slot: Slot::Night, shift: Shift::Evening });
        assert!(policy.validate().is_err());
    }

    #[test]
    fn unmapped_slot_rejected() {
        let mut policy = ShiftPolicy::default();
        policy.slot_shifts.retain(|m| m.slot != Slot::Afternoon);
        assert!(policy.validate().is_err());
        assert!(policy.shift_for_slot(Slot::Afternoon).is_err());
    }

    #[test]
    fn stable_self_care_marks_own_doses() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let dose = dose_in(Slot::Morning, patient.id);

        let marker = authorized_marker(&conn, &ShiftPolicy::default(), &patient, &dose).unwrap();
        assert_eq!(marker, ActorRef::Patient(patient.id));
    }

    #[test]
    fn stable_family_caretaker_marks() {
        let conn = open_memory_database().unwrap();
        let mut patient = seed_patient(&conn, "Asha");
        let family = Uuid::new_v4();
        patient.caretaker = Caretaker::Family {
            actor_id: family,
            name: "Ravi".into(),
            phone: "+919876543210".into(),
        };
        let dose = dose_in(Slot::Night, patient.id);

        let marker = authorized_marker(&conn, &ShiftPolicy::default(), &patient, &dose).unwrap();
        assert_eq!(marker, ActorRef::Family(family));
    }

    #[test]
    fn critical_patient_resolves_shift_staff() {
        let conn = open_memory_database().unwrap();
        let mut patient = seed_patient(&conn, "Asha");
        let evening = seed_staff(&conn, "Meera", Shift::Evening);
        assign(&conn, &patient.id, Shift::Evening, &evening.id);
        patient.condition = PatientCondition::Critical;

        let dose = dose_in(Slot::Afternoon, patient.id);
        let marker = authorized_marker(&conn, &ShiftPolicy::default(), &patient, &dose).unwrap();
        assert_eq!(marker, ActorRef::Staff(evening.id));
    }

    #[test]
    fn critical_patient_without_shift_staff_fails() {
        let conn = open_memory_database().unwrap();
        let mut patient = seed_patient(&conn, "Asha");
        patient.condition = PatientCondition::Critical;

        let dose = dose_in(Slot::Night, patient.id);
        let err = authorized_marker(&conn, &ShiftPolicy::default(), &patient, &dose).unwrap_err();
        match err {
            CoverageError::NoCoverageAssigned { patient_id, shift } => {
                assert_eq!(patient_id, patient.id);
                assert_eq!(shift, Shift::Night);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stable_staff_caretaker_uses_coverage() {
        let conn = open_memory_database().unwrap();
        let mut patient = seed_patient(&conn, "Asha");
        let morning = seed_staff(&conn, "Kiran", Shift::Morning);
        assign(&conn, &patient.id, Shift::Morning, &morning.id);
        patient.caretaker = Caretaker::Staff;

        let dose = dose_in(Slot::Morning, patient.id);
        let marker = authorized_marker(&conn, &ShiftPolicy::default(), &patient, &dose).unwrap();
        assert_eq!(marker, ActorRef::Staff(morning.id));
    }

    #[test]
    fn missing_shifts_lists_unassigned() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let night = seed_staff(&conn, "Joy", Shift::Night);
        assign(&conn, &patient.id, Shift::Night, &night.id);

        assert_eq!(
            missing_shifts(&conn, &patient.id).unwrap(),
            vec![Shift::Morning, Shift::Evening]
        );
    }
}

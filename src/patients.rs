//! Patient records, caretaker and condition changes, care coverage and
//! patient–doctor link requests.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core_state::{CoreError, CoreState};
use crate::coverage::{self, CoverageError};
use crate::db::{self, DatabaseError};
use crate::directory::normalize_contact;
use crate::models::enums::{AccountStatus, DoctorStatus, LinkRequestStatus, PatientCondition, Shift};
use crate::models::{Caretaker, CoverageAssignment, LinkRequest, Patient};

/// 7 to 15 digits with an optional leading `+`, after removing spaces and dashes.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?\d{7,15}$").unwrap());

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Coverage incomplete, missing shifts: {}", format_shifts(.missing))]
    IncompleteCoverage { missing: Vec<Shift> },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Coverage(#[from] CoverageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

fn format_shifts(shifts: &[Shift]) -> String {
    shifts.iter().map(Shift::as_str).collect::<Vec<_>>().join(", ")
}

fn begin(conn: &mut Connection) -> Result<rusqlite::Transaction<'_>, PatientError> {
    Ok(conn.transaction().map_err(DatabaseError::from)?)
}

fn commit(tx: rusqlite::Transaction<'_>) -> Result<(), PatientError> {
    Ok(tx.commit().map_err(DatabaseError::from)?)
}

pub fn normalize_phone(phone: &str) -> Option<String> {
    let compact: String = phone.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    PHONE_PATTERN.is_match(&compact).then_some(compact)
}

// ═══════════════════════════════════════════
// Patient records
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
}

/// Register a STABLE, self-caring patient with no linked doctor.
pub fn register_patient(conn: &Connection, input: &NewPatient, now: NaiveDateTime) -> Result<Patient, PatientError> {
    let (name, email) = normalize_contact(&input.name, &input.email).map_err(PatientError::Validation)?;
    let phone = match input.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(raw) => Some(
            normalize_phone(raw)
                .ok_or_else(|| PatientError::Validation(format!("'{raw}' is not a valid phone number")))?,
        ),
        None => None,
    };

    let patient = Patient {
        id: Uuid::new_v4(),
        name,
        email,
        age: input.age,
        gender: input.gender.clone(),
        blood_group: input.blood_group.clone(),
        phone,
        emergency_contact: input.emergency_contact.clone(),
        doctor_id: None,
        caretaker: Caretaker::SelfCare,
        condition: PatientCondition::Stable,
        status: AccountStatus::Active,
        created_at: now,
    };
    db::insert_patient(conn, &patient).map_err(|e| {
        if e.is_constraint_violation() {
            PatientError::Conflict(format!("email {} is already registered", patient.email))
        } else {
            PatientError::Database(e)
        }
    })?;
    tracing::info!(patient_id = %patient.id, "Patient registered");
    Ok(patient)
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Patient, PatientError> {
    db::get_patient(conn, id)?.ok_or(PatientError::NotFound {
        entity_type: "patient",
        id: *id,
    })
}

/// Replace the caretaker. A STABLE patient moving off the staff caretaker
/// loses their shift coverage.
pub fn set_caretaker(conn: &mut Connection, id: &Uuid, caretaker: Caretaker) -> Result<Patient, PatientError> {
    let patient = get_patient(conn, id)?;
    let caretaker = match caretaker {
        Caretaker::Family { actor_id, name, phone } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(PatientError::Validation("family caretaker name is required".into()));
            }
            let phone = normalize_phone(&phone)
                .ok_or_else(|| PatientError::Validation(format!("'{phone}' is not a valid phone number")))?;
            if actor_id == patient.id {
                return Err(PatientError::Validation(
                    "a family caretaker must be someone other than the patient".into(),
                ));
            }
            Caretaker::Family { actor_id, name, phone }
        }
        other => other,
    };

    let tx = begin(conn)?;
    db::update_patient_caretaker(&tx, id, &caretaker).map_err(|e| {
        if e.is_constraint_violation() {
            PatientError::Conflict("family caretaker already cares for another patient".into())
        } else {
            PatientError::Database(e)
        }
    })?;
    if patient.condition == PatientCondition::Stable && caretaker != Caretaker::Staff {
        let cleared = db::clear_coverage(&tx, id)?;
        if cleared > 0 {
            tracing::debug!(patient_id = %id, cleared, "Cleared shift coverage");
        }
    }
    commit(tx)?;

    tracing::info!(patient_id = %id, caretaker = %caretaker.kind(), "Caretaker updated");
    get_patient(conn, id)
}

/// Flip condition. CRITICAL requires coverage on every shift; returning to
/// STABLE with a non-staff caretaker clears coverage.
pub fn set_condition(
    conn: &mut Connection,
    id: &Uuid,
    condition: PatientCondition,
) -> Result<Patient, PatientError> {
    let patient = get_patient(conn, id)?;

    let tx = begin(conn)?;
    match condition {
        PatientCondition::Critical => {
            let missing = coverage::missing_shifts(&tx, id)?;
            if !missing.is_empty() {
                return Err(PatientError::IncompleteCoverage { missing });
            }
        }
        PatientCondition::Stable => {
            if patient.caretaker != Caretaker::Staff {
                db::clear_coverage(&tx, id)?;
            }
        }
    }
    db::update_patient_condition(&tx, id, condition)?;
    commit(tx)?;

    tracing::info!(patient_id = %id, %condition, "Patient condition updated");
    get_patient(conn, id)
}

// ═══════════════════════════════════════════
// Care coverage
// ═══════════════════════════════════════════

/// Assign (or replace) the staff member covering one of a patient's shifts.
pub fn assign_coverage(
    conn: &Connection,
    patient_id: &Uuid,
    shift: Shift,
    staff_id: &Uuid,
    now: NaiveDateTime,
) -> Result<CoverageAssignment, PatientError> {
    get_patient(conn, patient_id)?;
    let staff = db::get_staff(conn, staff_id)?.ok_or(PatientError::NotFound {
        entity_type: "staff",
        id: *staff_id,
    })?;
    if staff.status != AccountStatus::Active {
        return Err(PatientError::Validation(format!("staff {staff_id} is inactive")));
    }
    if staff.shift != shift {
        return Err(PatientError::Validation(format!(
            "staff {staff_id} works the {} shift, not {shift}",
            staff.shift
        )));
    }

    let assignment = CoverageAssignment {
        patient_id: *patient_id,
        shift,
        staff_id: *staff_id,
        assigned_at: now,
    };
    db::upsert_coverage(conn, &assignment)?;
    tracing::info!(patient_id = %patient_id, %shift, staff_id = %staff_id, "Coverage assigned");
    Ok(assignment)
}

/// Remove a shift assignment. Rejected while the patient is CRITICAL.
pub fn remove_coverage(conn: &Connection, patient_id: &Uuid, shift: Shift) -> Result<(), PatientError> {
    let patient = get_patient(conn, patient_id)?;
    if patient.condition == PatientCondition::Critical {
        return Err(PatientError::IncompleteCoverage { missing: vec![shift] });
    }
    if !db::delete_coverage(conn, patient_id, shift)? {
        return Err(PatientError::Conflict(format!(
            "patient {patient_id} has no {shift} coverage"
        )));
    }
    tracing::info!(patient_id = %patient_id, %shift, "Coverage removed");
    Ok(())
}

pub fn list_coverage(conn: &Connection, patient_id: &Uuid) -> Result<Vec<CoverageAssignment>, PatientError> {
    get_patient(conn, patient_id)?;
    Ok(db::list_coverage(conn, patient_id)?)
}

// ═══════════════════════════════════════════
// Link requests
// ═══════════════════════════════════════════

/// A patient asks an approved doctor to take them on.
pub fn request_link(
    conn: &Connection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
    now: NaiveDateTime,
) -> Result<LinkRequest, PatientError> {
    let patient = get_patient(conn, patient_id)?;
    let doctor = db::get_doctor(conn, doctor_id)?.ok_or(PatientError::NotFound {
        entity_type: "doctor",
        id: *doctor_id,
    })?;
    if doctor.status != DoctorStatus::Approved {
        return Err(PatientError::Validation(format!("doctor {doctor_id} is not approved")));
    }
    if patient.doctor_id == Some(*doctor_id) {
        return Err(PatientError::Conflict(format!(
            "patient {patient_id} is already linked to doctor {doctor_id}"
        )));
    }

    let request = LinkRequest {
        id: Uuid::new_v4(),
        patient_id: *patient_id,
        doctor_id: *doctor_id,
        status: LinkRequestStatus::Pending,
        created_at: now,
        decided_at: None,
    };
    db::insert_link_request(conn, &request).map_err(|e| {
        if e.is_constraint_violation() {
            PatientError::Conflict("a pending request to this doctor already exists".into())
        } else {
            PatientError::Database(e)
        }
    })?;
    Ok(request)
}

pub fn pending_requests(conn: &Connection, doctor_id: &Uuid) -> Result<Vec<LinkRequest>, PatientError> {
    if db::get_doctor(conn, doctor_id)?.is_none() {
        return Err(PatientError::NotFound {
            entity_type: "doctor",
            id: *doctor_id,
        });
    }
    Ok(db::list_pending_link_requests(conn, doctor_id)?)
}

/// Accept or reject a pending request on behalf of the addressed doctor.
/// Accepting links the patient to that doctor.
pub fn decide_link_request(
    conn: &mut Connection,
    request_id: &Uuid,
    doctor_id: &Uuid,
    accept: bool,
    now: NaiveDateTime,
) -> Result<LinkRequest, PatientError> {
    let request = require_link_request(conn, request_id)?;
    if request.doctor_id != *doctor_id {
        return Err(PatientError::Forbidden(format!(
            "link request {request_id} is addressed to another doctor"
        )));
    }
    let doctor = db::get_doctor(conn, doctor_id)?.ok_or(PatientError::NotFound {
        entity_type: "doctor",
        id: *doctor_id,
    })?;
    if doctor.status != DoctorStatus::Approved {
        return Err(PatientError::Forbidden(format!("doctor {doctor_id} is not approved")));
    }

    let status = if accept {
        LinkRequestStatus::Accepted
    } else {
        LinkRequestStatus::Rejected
    };

    let tx = begin(conn)?;
    if !db::decide_link_request(&tx, request_id, status, &now)? {
        return Err(PatientError::Conflict(format!(
            "link request {request_id} was already decided"
        )));
    }
    if accept {
        db::update_patient_doctor(&tx, &request.patient_id, doctor_id)?;
    }
    commit(tx)?;

    tracing::info!(request_id = %request_id, %status, "Link request decided");
    require_link_request(conn, request_id)
}

fn require_link_request(conn: &Connection, id: &Uuid) -> Result<LinkRequest, PatientError> {
    db::get_link_request(conn, id)?.ok_or(PatientError::NotFound {
        entity_type: "link request",
        id: *id,
    })
}

// ═══════════════════════════════════════════
// Timeline-locked entry points
// ═══════════════════════════════════════════

pub fn change_caretaker(core: &CoreState, id: &Uuid, caretaker: Caretaker) -> Result<Patient, PatientError> {
    core.with_patient_timeline(id, |conn| set_caretaker(conn, id, caretaker))
}

pub fn change_condition(
    core: &CoreState,
    id: &Uuid,
    condition: PatientCondition,
) -> Result<Patient, PatientError> {
    core.with_patient_timeline(id, |conn| set_condition(conn, id, condition))
}

pub fn cover_shift(
    core: &CoreState,
    patient_id: &Uuid,
    shift: Shift,
    staff_id: &Uuid,
    now: NaiveDateTime,
) -> Result<CoverageAssignment, PatientError> {
    core.with_patient_timeline(patient_id, |conn| {
        assign_coverage(conn, patient_id, shift, staff_id, now)
    })
}

pub fn uncover_shift(core: &CoreState, patient_id: &Uuid, shift: Shift) -> Result<(), PatientError> {
    core.with_patient_timeline(patient_id, |conn| remove_coverage(conn, patient_id, shift))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::test_support::*;

    fn family(phone: &str) -> Caretaker {
        Caretaker::Family {
            actor_id: Uuid::new_v4(),
            name: "Ravi".into(),
            phone: phone.into(),
        }
    }

    #[test]
    fn register_defaults_to_stable_self_care() {
        let conn = open_memory_database().unwrap();
        let input = NewPatient {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            age: Some(64),
            gender: None,
            blood_group: Some("B+".into()),
            phone: Some("+91 98765-43210".into()),
            emergency_contact: None,
        };
        let patient = register_patient(&conn, &input, at(1, 9, 0)).unwrap();
        assert_eq!(patient.condition, PatientCondition::Stable);
        assert_eq!(patient.caretaker, Caretaker::SelfCare);
        assert_eq!(patient.phone.as_deref(), Some("+919876543210"));
        assert_eq!(patient.doctor_id, None);

        let err = register_patient(&conn, &input, at(1, 9, 0)).unwrap_err();
        assert!(matches!(err, PatientError::Conflict(_)));
    }

    #[test]
    fn phone_rules() {
        assert!(normalize_phone("9876543").is_some());
        assert!(normalize_phone("+123456789012345").is_some());
        assert!(normalize_phone("123456").is_none());
        assert!(normalize_phone("1234567890123456").is_none());
        assert!(normalize_phone("98765abc43").is_none());
        assert!(normalize_phone("++9876543").is_none());
    }

    #[test]
    fn family_caretaker_requires_valid_phone() {
        let mut conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");

        let err = set_caretaker(&mut conn, &patient.id, family("12-34")).unwrap_err();
        assert!(matches!(err, PatientError::Validation(_)));

        let updated = set_caretaker(&mut conn, &patient.id, family("98765 43210")).unwrap();
        match updated.caretaker {
            Caretaker::Family { phone, .. } => assert_eq!(phone, "9876543210"),
            other => panic!("unexpected caretaker {other:?}"),
        }
    }

    #[test]
    fn critical_flip_requires_all_shifts() {
        let mut conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let morning = seed_staff(&conn, "Kiran", Shift::Morning);
        assign_coverage(&conn, &patient.id, Shift::Morning, &morning.id, at(1, 9, 0)).unwrap();

        let err = set_condition(&mut conn, &patient.id, PatientCondition::Critical).unwrap_err();
        match err {
            PatientError::IncompleteCoverage { missing } => {
                assert_eq!(missing, vec![Shift::Evening, Shift::Night]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(get_patient(&conn, &patient.id).unwrap().condition, PatientCondition::Stable);

        let evening = seed_staff(&conn, "Meera", Shift::Evening);
        let night = seed_staff(&conn, "Joy", Shift::Night);
        assign_coverage(&conn, &patient.id, Shift::Evening, &evening.id, at(1, 9, 0)).unwrap();
        assign_coverage(&conn, &patient.id, Shift::Night, &night.id, at(1, 9, 0)).unwrap();

        let updated = set_condition(&mut conn, &patient.id, PatientCondition::Critical).unwrap();
        assert_eq!(updated.condition, PatientCondition::Critical);
    }

    #[test]
    fn stable_flip_clears_coverage_unless_staff_caretaker() {
        let mut conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        cover_all_shifts(&conn, &patient.id);
        set_condition(&mut conn, &patient.id, PatientCondition::Critical).unwrap();

        set_condition(&mut conn, &patient.id, PatientCondition::Stable).unwrap();
        assert!(list_coverage(&conn, &patient.id).unwrap().is_empty());

        let other = seed_patient(&conn, "Bala");
        cover_all_shifts(&conn, &other.id);
        set_caretaker(&mut conn, &other.id, Caretaker::Staff).unwrap();
        set_condition(&mut conn, &other.id, PatientCondition::Critical).unwrap();
        set_condition(&mut conn, &other.id, PatientCondition::Stable).unwrap();
        assert_eq!(list_coverage(&conn, &other.id).unwrap().len(), 3);
    }

    #[test]
    fn coverage_requires_matching_active_staff() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let night = seed_staff(&conn, "Joy", Shift::Night);

        let err = assign_coverage(&conn, &patient.id, Shift::Morning, &night.id, at(1, 9, 0)).unwrap_err();
        assert!(matches!(err, PatientError::Validation(_)));

        let err = assign_coverage(&conn, &patient.id, Shift::Night, &Uuid::new_v4(), at(1, 9, 0)).unwrap_err();
        assert!(matches!(err, PatientError::NotFound { entity_type: "staff", .. }));

        db::update_staff_status(&conn, &night.id, AccountStatus::Inactive).unwrap();
        let err = assign_coverage(&conn, &patient.id, Shift::Night, &night.id, at(1, 9, 0)).unwrap_err();
        assert!(matches!(err, PatientError::Validation(_)));
    }

    #[test]
    fn reassignment_replaces_staff() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let first = seed_staff(&conn, "Joy", Shift::Night);
        let second = seed_staff(&conn, "Lata", Shift::Night);
        assign_coverage(&conn, &patient.id, Shift::Night, &first.id, at(1, 9, 0)).unwrap();
        assign_coverage(&conn, &patient.id, Shift::Night, &second.id, at(1, 10, 0)).unwrap();

        let coverage = list_coverage(&conn, &patient.id).unwrap();
        assert_eq!(coverage.len(), 1);
        assert_eq!(coverage[0].staff_id, second.id);
    }

    #[test]
    fn coverage_removal_blocked_while_critical() {
        let mut conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        cover_all_shifts(&conn, &patient.id);
        set_condition(&mut conn, &patient.id, PatientCondition::Critical).unwrap();

        let err = remove_coverage(&conn, &patient.id, Shift::Evening).unwrap_err();
        assert!(matches!(err, PatientError::IncompleteCoverage { .. }));
        assert_eq!(list_coverage(&conn, &patient.id).unwrap().len(), 3);
    }

    #[test]
    fn link_request_accept_links_patient() {
        let mut conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let doctor = seed_doctor(&conn, "Dr. Rao");

        let request = request_link(&conn, &patient.id, &doctor.id, at(1, 9, 0)).unwrap();
        let err = request_link(&conn, &patient.id, &doctor.id, at(1, 9, 5)).unwrap_err();
        assert!(matches!(err, PatientError::Conflict(_)));
        assert_eq!(pending_requests(&conn, &doctor.id).unwrap().len(), 1);

        let decided = decide_link_request(&mut conn, &request.id, &doctor.id, true, at(1, 10, 0)).unwrap();
        assert_eq!(decided.status, LinkRequestStatus::Accepted);
        assert_eq!(decided.decided_at, Some(at(1, 10, 0)));
        assert_eq!(get_patient(&conn, &patient.id).unwrap().doctor_id, Some(doctor.id));
        assert!(pending_requests(&conn, &doctor.id).unwrap().is_empty());

        let err = decide_link_request(&mut conn, &request.id, &doctor.id, false, at(1, 11, 0)).unwrap_err();
        assert!(matches!(err, PatientError::Conflict(_)));
    }

    #[test]
    fn link_request_reject_and_foreign_doctor() {
        let mut conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let doctor = seed_doctor(&conn, "Dr. Rao");
        let other = seed_doctor(&conn, "Dr. Iyer");
        let request = request_link(&conn, &patient.id, &doctor.id, at(1, 9, 0)).unwrap();

        let err = decide_link_request(&mut conn, &request.id, &other.id, true, at(1, 10, 0)).unwrap_err();
        assert!(matches!(err, PatientError::Forbidden(_)));

        let decided = decide_link_request(&mut conn, &request.id, &doctor.id, false, at(1, 10, 0)).unwrap();
        assert_eq!(decided.status, LinkRequestStatus::Rejected);
        assert_eq!(get_patient(&conn, &patient.id).unwrap().doctor_id, None);
    }

    #[test]
    fn link_request_to_unapproved_doctor_rejected() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let doctor = seed_doctor(&conn, "Dr. Rao");
        db::update_doctor_status(&conn, &doctor.id, DoctorStatus::Pending).unwrap();

        let err = request_link(&conn, &patient.id, &doctor.id, at(1, 9, 0)).unwrap_err();
        assert!(matches!(err, PatientError::Validation(_)));
    }

    #[test]
    fn locked_entry_points_apply_condition_rules() {
        let (_dir, core) = test_core();
        let conn = core.open_db().unwrap();
        let patient = seed_patient(&conn, "Asha");
        let staff: Vec<_> = Shift::ALL
            .iter()
            .map(|shift| seed_staff(&conn, "Nurse", *shift))
            .collect();

        let err = change_condition(&core, &patient.id, PatientCondition::Critical).unwrap_err();
        assert!(matches!(err, PatientError::IncompleteCoverage { ref missing } if missing.len() == 3));

        for member in &staff {
            cover_shift(&core, &patient.id, member.shift, &member.id, at(1, 8, 0)).unwrap();
        }
        let flipped = change_condition(&core, &patient.id, PatientCondition::Critical).unwrap();
        assert_eq!(flipped.condition, PatientCondition::Critical);

        let err = uncover_shift(&core, &patient.id, Shift::Night).unwrap_err();
        assert!(matches!(err, PatientError::IncompleteCoverage { .. }));
    }
}

//! Doctor, staff and medicine directories plus the admin overview.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError, DirectoryCounts};
use crate::models::enums::{AccountStatus, DoctorStatus, Shift, StaffRole};
use crate::models::{Doctor, Medicine, Staff};

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Trimmed name and lowercased email, or a description of what is wrong.
pub(crate) fn normalize_contact(name: &str, email: &str) -> Result<(String, String), String> {
    let name = name.trim();
    let email = email.trim().to_lowercase();
    if name.is_empty() {
        return Err("name is required".into());
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(format!("'{email}' is not a valid email address")),
    }
    Ok((name.to_string(), email))
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Maps a UNIQUE violation to `Conflict` with the given message.
fn conflict_on_duplicate(err: DatabaseError, message: impl FnOnce() -> String) -> DirectoryError {
    if err.is_constraint_violation() {
        DirectoryError::Conflict(message())
    } else {
        DirectoryError::Database(err)
    }
}

// ═══════════════════════════════════════════
// Doctors
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoctor {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub hospital: Option<String>,
}

/// Register a doctor awaiting admin approval.
pub fn register_doctor(conn: &Connection, input: &NewDoctor, now: NaiveDateTime) -> Result<Doctor, DirectoryError> {
    let (name, email) = normalize_contact(&input.name, &input.email).map_err(DirectoryError::Validation)?;
    let doctor = Doctor {
        id: Uuid::new_v4(),
        name,
        email,
        specialization: optional_text(&input.specialization),
        hospital: optional_text(&input.hospital),
        status: DoctorStatus::Pending,
        created_at: now,
    };
    db::insert_doctor(conn, &doctor)
        .map_err(|e| conflict_on_duplicate(e, || format!("email {} is already registered", doctor.email)))?;
    tracing::info!(doctor_id = %doctor.id, "Doctor registered");
    Ok(doctor)
}

pub fn approve_doctor(conn: &Connection, id: &Uuid) -> Result<Doctor, DirectoryError> {
    let doctor = require_doctor(conn, id)?;
    if doctor.status == DoctorStatus::Approved {
        return Ok(doctor);
    }
    db::update_doctor_status(conn, id, DoctorStatus::Approved)?;
    tracing::info!(doctor_id = %id, "Doctor approved");
    require_doctor(conn, id)
}

fn require_doctor(conn: &Connection, id: &Uuid) -> Result<Doctor, DirectoryError> {
    db::get_doctor(conn, id)?.ok_or(DirectoryError::NotFound {
        entity_type: "doctor",
        id: *id,
    })
}

// ═══════════════════════════════════════════
// Staff
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStaff {
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    #[serde(default)]
    pub hospital: Option<String>,
    pub shift: Shift,
}

pub fn register_staff(conn: &Connection, input: &NewStaff, now: NaiveDateTime) -> Result<Staff, DirectoryError> {
    let (name, email) = normalize_contact(&input.name, &input.email).map_err(DirectoryError::Validation)?;
    let staff = Staff {
        id: Uuid::new_v4(),
        name,
        email,
        role: input.role,
        hospital: optional_text(&input.hospital),
        shift: input.shift,
        status: AccountStatus::Active,
        created_at: now,
    };
    db::insert_staff(conn, &staff)
        .map_err(|e| conflict_on_duplicate(e, || format!("email {} is already registered", staff.email)))?;
    tracing::info!(staff_id = %staff.id, shift = %staff.shift, "Staff registered");
    Ok(staff)
}

/// Activate or deactivate a staff member. A member still assigned to
/// patients cannot be deactivated.
pub fn set_staff_status(conn: &Connection, id: &Uuid, status: AccountStatus) -> Result<Staff, DirectoryError> {
    if db::get_staff(conn, id)?.is_none() {
        return Err(DirectoryError::NotFound {
            entity_type: "staff",
            id: *id,
        });
    }
    if status == AccountStatus::Inactive {
        let assignments = db::list_coverage_for_staff(conn, id)?;
        if !assignments.is_empty() {
            return Err(DirectoryError::Conflict(format!(
                "staff {id} still covers {} patient shift(s)",
                assignments.len()
            )));
        }
    }
    db::update_staff_status(conn, id, status)?;
    db::get_staff(conn, id)?.ok_or(DirectoryError::NotFound {
        entity_type: "staff",
        id: *id,
    })
}

// ═══════════════════════════════════════════
// Medicines
// ═══════════════════════════════════════════

pub fn add_medicine(conn: &Connection, name: &str) -> Result<Medicine, DirectoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DirectoryError::Validation("medicine name is required".into()));
    }
    let medicine = Medicine {
        id: Uuid::new_v4(),
        name: name.to_string(),
    };
    db::insert_medicine(conn, &medicine)
        .map_err(|e| conflict_on_duplicate(e, || format!("medicine '{name}' already exists")))?;
    Ok(medicine)
}

pub fn list_medicines(conn: &Connection, search: Option<&str>) -> Result<Vec<Medicine>, DirectoryError> {
    Ok(db::list_medicines(conn, search)?)
}

pub fn overview(conn: &Connection) -> Result<DirectoryCounts, DirectoryError> {
    Ok(db::fetch_directory_counts(conn)?)
}

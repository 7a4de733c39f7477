use std::str::FromStr;

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, name, email, age, gender, blood_group, phone, emergency_contact,
     doctor_id, caretaker_kind, family_actor_id, family_name, family_phone, condition, status, created_at";

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let (kind, actor_id, family_name, family_phone) = caretaker_columns(&patient.caretaker);
    conn.execute(
        "INSERT INTO patients (id, name, email, age, gender, blood_group, phone, emergency_contact,
         doctor_id, caretaker_kind, family_actor_id, family_name, family_phone, condition, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.email,
            patient.age,
            patient.gender,
            patient.blood_group,
            patient.phone,
            patient.emergency_contact,
            patient.doctor_id.map(|id| id.to_string()),
            kind,
            actor_id,
            family_name,
            family_phone,
            patient.condition.as_str(),
            patient.status.as_str(),
            fmt_datetime(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(params![id.to_string()], patient_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(patient_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Like [`get_patient`] but absence is an error.
pub fn require_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    get_patient(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "patient".into(),
        id: id.to_string(),
    })
}

pub fn list_patients_by_doctor(conn: &Connection, doctor_id: &Uuid) -> Result<Vec<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE doctor_id = ?1 ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![doctor_id.to_string()], patient_row_from_rusqlite)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

pub fn update_patient_caretaker(
    conn: &Connection,
    id: &Uuid,
    caretaker: &Caretaker,
) -> Result<(), DatabaseError> {
    let (kind, actor_id, family_name, family_phone) = caretaker_columns(caretaker);
    let changed = conn.execute(
        "UPDATE patients SET caretaker_kind = ?2, family_actor_id = ?3, family_name = ?4, family_phone = ?5
         WHERE id = ?1",
        params![id.to_string(), kind, actor_id, family_name, family_phone],
    )?;
    ensure_updated(changed, id)
}

pub fn update_patient_condition(
    conn: &Connection,
    id: &Uuid,
    condition: PatientCondition,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET condition = ?2 WHERE id = ?1",
        params![id.to_string(), condition.as_str()],
    )?;
    ensure_updated(changed, id)
}

pub fn update_patient_doctor(conn: &Connection, id: &Uuid, doctor_id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET doctor_id = ?2 WHERE id = ?1",
        params![id.to_string(), doctor_id.to_string()],
    )?;
    ensure_updated(changed, id)
}

pub fn count_patients(conn: &Connection) -> Result<u32, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    Ok(count)
}

fn ensure_updated(changed: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn caretaker_columns(
    caretaker: &Caretaker,
) -> (&'static str, Option<String>, Option<String>, Option<String>) {
    match caretaker {
        Caretaker::Family {
            actor_id,
            name,
            phone,
        } => (
            CaretakerKind::Family.as_str(),
            Some(actor_id.to_string()),
            Some(name.clone()),
            Some(phone.clone()),
        ),
        other => (other.kind().as_str(), None, None, None),
    }
}

struct PatientRow {
    id: String,
    name: String,
    email: String,
    age: Option<u32>,
    gender: Option<String>,
    blood_group: Option<String>,
    phone: Option<String>,
    emergency_contact: Option<String>,
    doctor_id: Option<String>,
    caretaker_kind: String,
    family_actor_id: Option<String>,
    family_name: Option<String>,
    family_phone: Option<String>,
    condition: String,
    status: String,
    created_at: String,
}

fn patient_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        age: row.get(3)?,
        gender: row.get(4)?,
        blood_group: row.get(5)?,
        phone: row.get(6)?,
        emergency_contact: row.get(7)?,
        doctor_id: row.get(8)?,
        caretaker_kind: row.get(9)?,
        family_actor_id: row.get(10)?,
        family_name: row.get(11)?,
        family_phone: row.get(12)?,
        condition: row.get(13)?,
        status: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    let caretaker = match CaretakerKind::from_str(&row.caretaker_kind)? {
        CaretakerKind::SelfCare => Caretaker::SelfCare,
        CaretakerKind::Staff => Caretaker::Staff,
        CaretakerKind::Family => {
            let actor_id = parse_opt_uuid("family_actor_id", row.family_actor_id)?;
            match (actor_id, row.family_name, row.family_phone) {
                (Some(actor_id), Some(name), Some(phone)) => Caretaker::Family {
                    actor_id,
                    name,
                    phone,
                },
                _ => {
                    return Err(DatabaseError::ConstraintViolation(format!(
                        "patient {} has family caretaker without contact details",
                        row.id
                    )))
                }
            }
        }
    };

    Ok(Patient {
        id: parse_uuid("patients.id", &row.id)?,
        name: row.name,
        email: row.email,
        age: row.age,
        gender: row.gender,
        blood_group: row.blood_group,
        phone: row.phone,
        emergency_contact: row.emergency_contact,
        doctor_id: parse_opt_uuid("doctor_id", row.doctor_id)?,
        caretaker,
        condition: PatientCondition::from_str(&row.condition)?,
        status: AccountStatus::from_str(&row.status)?,
        created_at: parse_datetime("patients.created_at", &row.created_at)?,
    })
}

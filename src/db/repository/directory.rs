use std::str::FromStr;

use rusqlite::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

// ═══════════════════════════════════════════
// Doctors
// ═══════════════════════════════════════════

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, name, email, specialization, hospital, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            doctor.id.to_string(),
            doctor.name,
            doctor.email,
            doctor.specialization,
            doctor.hospital,
            doctor.status.as_str(),
            fmt_datetime(&doctor.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, name, email, specialization, hospital, status, created_at
         FROM doctors WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        },
    );

    match result {
        Ok((id, name, email, specialization, hospital, status, created_at)) => Ok(Some(Doctor {
            id: parse_uuid("doctors.id", &id)?,
            name,
            email,
            specialization,
            hospital,
            status: DoctorStatus::from_str(&status)?,
            created_at: parse_datetime("doctors.created_at", &created_at)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_doctor_status(conn: &Connection, id: &Uuid, status: DoctorStatus) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET status = ?2 WHERE id = ?1",
        params![id.to_string(), status.as_str()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "doctor".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Staff
// ═══════════════════════════════════════════

pub fn insert_staff(conn: &Connection, staff: &Staff) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO staff (id, name, email, role, hospital, shift, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            staff.id.to_string(),
            staff.name,
            staff.email,
            staff.role.as_str(),
            staff.hospital,
            staff.shift.as_str(),
            staff.status.as_str(),
            fmt_datetime(&staff.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_staff(conn: &Connection, id: &Uuid) -> Result<Option<Staff>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, role, hospital, shift, status, created_at FROM staff WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![id.to_string()], staff_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(staff_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_staff_status(conn: &Connection, id: &Uuid, status: AccountStatus) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE staff SET status = ?2 WHERE id = ?1",
        params![id.to_string(), status.as_str()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "staff".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct StaffRow {
    id: String,
    name: String,
    email: String,
    role: String,
    hospital: Option<String>,
    shift: String,
    status: String,
    created_at: String,
}

fn staff_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<StaffRow> {
    Ok(StaffRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        hospital: row.get(4)?,
        shift: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn staff_from_row(row: StaffRow) -> Result<Staff, DatabaseError> {
    Ok(Staff {
        id: parse_uuid("staff.id", &row.id)?,
        name: row.name,
        email: row.email,
        role: StaffRole::from_str(&row.role)?,
        hospital: row.hospital,
        shift: Shift::from_str(&row.shift)?,
        status: AccountStatus::from_str(&row.status)?,
        created_at: parse_datetime("staff.created_at", &row.created_at)?,
    })
}

// ═══════════════════════════════════════════
// Medicines
// ═══════════════════════════════════════════

pub fn insert_medicine(conn: &Connection, medicine: &Medicine) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medicines (id, name) VALUES (?1, ?2)",
        params![medicine.id.to_string(), medicine.name],
    )?;
    Ok(())
}

pub fn get_medicine(conn: &Connection, id: &Uuid) -> Result<Option<Medicine>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, name FROM medicines WHERE id = ?1",
        params![id.to_string()],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );

    match result {
        Ok((id, name)) => Ok(Some(Medicine {
            id: parse_uuid("medicines.id", &id)?,
            name,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Case-insensitive lookup; medicine names are unique under NOCASE.
pub fn get_medicine_by_name(conn: &Connection, name: &str) -> Result<Option<Medicine>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, name FROM medicines WHERE name = ?1",
        params![name.trim()],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );

    match result {
        Ok((id, name)) => Ok(Some(Medicine {
            id: parse_uuid("medicines.id", &id)?,
            name,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_medicines(conn: &Connection, search: Option<&str>) -> Result<Vec<Medicine>, DatabaseError> {
    let pattern = format!("%{}%", search.unwrap_or("").trim());
    let mut stmt = conn.prepare(
        "SELECT id, name FROM medicines WHERE LOWER(name) LIKE LOWER(?1) ORDER BY name",
    )?;
    let rows = stmt.query_map(params![pattern], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut medicines = Vec::new();
    for row in rows {
        let (id, name) = row?;
        medicines.push(Medicine {
            id: parse_uuid("medicines.id", &id)?,
            name,
        });
    }
    Ok(medicines)
}

// ═══════════════════════════════════════════
// Overview
// ═══════════════════════════════════════════

/// Head-count tiles for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryCounts {
    pub doctors: u32,
    pub patients: u32,
    pub staff: u32,
    pub pending_approvals: u32,
}

pub fn fetch_directory_counts(conn: &Connection) -> Result<DirectoryCounts, DatabaseError> {
    let count = |sql: &str| -> Result<u32, DatabaseError> {
        conn.query_row(sql, [], |row| row.get(0))
            .map_err(DatabaseError::from)
    };

    Ok(DirectoryCounts {
        doctors: count("SELECT COUNT(*) FROM doctors")?,
        patients: count("SELECT COUNT(*) FROM patients")?,
        staff: count("SELECT COUNT(*) FROM staff")?,
        pending_approvals: count("SELECT COUNT(*) FROM doctors WHERE status = 'pending'")?,
    })
}

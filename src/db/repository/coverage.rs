use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::Shift;
use crate::models::CoverageAssignment;

/// Insert or replace the staff member covering (patient, shift).
pub fn upsert_coverage(conn: &Connection, assignment: &CoverageAssignment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO care_coverage (patient_id, shift, staff_id, assigned_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(patient_id, shift) DO UPDATE SET
            staff_id = excluded.staff_id,
            assigned_at = excluded.assigned_at",
        params![
            assignment.patient_id.to_string(),
            assignment.shift.as_str(),
            assignment.staff_id.to_string(),
            fmt_datetime(&assignment.assigned_at),
        ],
    )?;
    Ok(())
}

pub fn get_coverage(
    conn: &Connection,
    patient_id: &Uuid,
    shift: Shift,
) -> Result<Option<CoverageAssignment>, DatabaseError> {
    let result = conn.query_row(
        "SELECT staff_id, assigned_at FROM care_coverage WHERE patient_id = ?1 AND shift = ?2",
        params![patient_id.to_string(), shift.as_str()],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );

    match result {
        Ok((staff_id, assigned_at)) => Ok(Some(CoverageAssignment {
            patient_id: *patient_id,
            shift,
            staff_id: parse_uuid("care_coverage.staff_id", &staff_id)?,
            assigned_at: parse_datetime("care_coverage.assigned_at", &assigned_at)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All assignments for a patient in shift order.
pub fn list_coverage(conn: &Connection, patient_id: &Uuid) -> Result<Vec<CoverageAssignment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT shift, staff_id, assigned_at FROM care_coverage WHERE patient_id = ?1",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut assignments = Vec::new();
    for row in rows {
        let (shift, staff_id, assigned_at) = row?;
        assignments.push(CoverageAssignment {
            patient_id: *patient_id,
            shift: Shift::from_str(&shift)?,
            staff_id: parse_uuid("care_coverage.staff_id", &staff_id)?,
            assigned_at: parse_datetime("care_coverage.assigned_at", &assigned_at)?,
        });
    }
    assignments.sort_by_key(|a| Shift::ALL.iter().position(|s| *s == a.shift));
    Ok(assignments)
}

/// Returns true if an assignment existed.
pub fn delete_coverage(conn: &Connection, patient_id: &Uuid, shift: Shift) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM care_coverage WHERE patient_id = ?1 AND shift = ?2",
        params![patient_id.to_string(), shift.as_str()],
    )?;
    Ok(deleted > 0)
}

pub fn clear_coverage(conn: &Connection, patient_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM care_coverage WHERE patient_id = ?1",
        params![patient_id.to_string()],
    )?;
    Ok(deleted)
}

/// (patient, shift) pairs a staff member is responsible for.
pub fn list_coverage_for_staff(conn: &Connection, staff_id: &Uuid) -> Result<Vec<(Uuid, Shift)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT patient_id, shift FROM care_coverage WHERE staff_id = ?1",
    )?;
    let rows = stmt.query_map(params![staff_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut pairs = Vec::new();
    for row in rows {
        let (patient_id, shift) = row?;
        pairs.push((
            parse_uuid("care_coverage.patient_id", &patient_id)?,
            Shift::from_str(&shift)?,
        ));
    }
    Ok(pairs)
}

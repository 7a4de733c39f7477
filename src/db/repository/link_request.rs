use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_opt_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::LinkRequestStatus;
use crate::models::LinkRequest;

pub fn insert_link_request(conn: &Connection, request: &LinkRequest) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO link_requests (id, patient_id, doctor_id, status, created_at, decided_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            request.id.to_string(),
            request.patient_id.to_string(),
            request.doctor_id.to_string(),
            request.status.as_str(),
            fmt_datetime(&request.created_at),
            request.decided_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_link_request(conn: &Connection, id: &Uuid) -> Result<Option<LinkRequest>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, doctor_id, status, created_at, decided_at
         FROM link_requests WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![id.to_string()], link_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(link_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pending requests addressed to a doctor, oldest first.
pub fn list_pending_link_requests(conn: &Connection, doctor_id: &Uuid) -> Result<Vec<LinkRequest>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, doctor_id, status, created_at, decided_at
         FROM link_requests WHERE doctor_id = ?1 AND status = 'pending'
         ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string()], link_row_from_rusqlite)?;

    let mut requests = Vec::new();
    for row in rows {
        requests.push(link_from_row(row?)?);
    }
    Ok(requests)
}

/// Move a pending request to `status`. Returns false if it was no longer pending.
pub fn decide_link_request(
    conn: &Connection,
    id: &Uuid,
    status: LinkRequestStatus,
    decided_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE link_requests SET status = ?2, decided_at = ?3 WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), status.as_str(), fmt_datetime(decided_at)],
    )?;
    Ok(changed == 1)
}

type LinkRow = (String, String, String, String, String, Option<String>);

fn link_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<LinkRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn link_from_row(row: LinkRow) -> Result<LinkRequest, DatabaseError> {
    let (id, patient_id, doctor_id, status, created_at, decided_at) = row;
    Ok(LinkRequest {
        id: parse_uuid("link_requests.id", &id)?,
        patient_id: parse_uuid("link_requests.patient_id", &patient_id)?,
        doctor_id: parse_uuid("link_requests.doctor_id", &doctor_id)?,
        status: LinkRequestStatus::from_str(&status)?,
        created_at: parse_datetime("link_requests.created_at", &created_at)?,
        decided_at: parse_opt_datetime("link_requests.decided_at", decided_at)?,
    })
}

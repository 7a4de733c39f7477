use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, parse_date, parse_datetime, parse_opt_datetime, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const DOSE_COLUMNS: &str = "id, order_id, prescription_id, patient_id, dose_date, slot,
     window_start, window_end, status, marked_at, marked_by, mark_source";

/// Insert unless (order, date, slot) already exists. Returns true if inserted.
pub fn insert_dose_if_absent(conn: &Connection, dose: &DoseInstance) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO dose_instances (id, order_id, prescription_id, patient_id, dose_date, slot,
         window_start, window_end, status, marked_at, marked_by, mark_source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(order_id, dose_date, slot) DO NOTHING",
        params![
            dose.id.to_string(),
            dose.order_id.to_string(),
            dose.prescription_id.to_string(),
            dose.patient_id.to_string(),
            fmt_date(&dose.date),
            dose.slot.as_str(),
            fmt_datetime(&dose.window.start),
            fmt_datetime(&dose.window.end),
            dose.status.as_str(),
            dose.marked_at.as_ref().map(fmt_datetime),
            dose.marked_by.map(|id| id.to_string()),
            dose.mark_source.map(|s| s.as_str()),
        ],
    )?;
    Ok(inserted == 1)
}

pub fn get_dose(conn: &Connection, id: &Uuid) -> Result<Option<DoseInstance>, DatabaseError> {
    let sql = format!("SELECT {DOSE_COLUMNS} FROM dose_instances WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(params![id.to_string()], dose_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(dose_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Owning patient of a dose, without loading the row.
pub fn get_dose_patient_id(conn: &Connection, id: &Uuid) -> Result<Option<Uuid>, DatabaseError> {
    let result = conn.query_row(
        "SELECT patient_id FROM dose_instances WHERE id = ?1",
        params![id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(patient_id) => Ok(Some(parse_uuid("dose_instances.patient_id", &patient_id)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// PENDING → `status`. Returns false when the dose was already resolved.
pub fn resolve_pending_dose(
    conn: &Connection,
    id: &Uuid,
    status: DoseStatus,
    marked_at: Option<&NaiveDateTime>,
    marked_by: Option<&Uuid>,
    source: Option<MarkSource>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE dose_instances SET status = ?2, marked_at = ?3, marked_by = ?4, mark_source = ?5
         WHERE id = ?1 AND status = 'pending'",
        params![
            id.to_string(),
            status.as_str(),
            marked_at.map(fmt_datetime),
            marked_by.map(|id| id.to_string()),
            source.map(|s| s.as_str()),
        ],
    )?;
    Ok(changed == 1)
}

/// PENDING doses whose window closed at or before `cutoff`, with their patient.
pub fn list_pending_closed_before(
    conn: &Connection,
    cutoff: &NaiveDateTime,
) -> Result<Vec<(Uuid, Uuid)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id FROM dose_instances
         WHERE status = 'pending' AND window_end <= ?1
         ORDER BY patient_id, window_end",
    )?;
    let rows = stmt.query_map(params![fmt_datetime(cutoff)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut doses = Vec::new();
    for row in rows {
        let (id, patient_id) = row?;
        doses.push((
            parse_uuid("dose_instances.id", &id)?,
            parse_uuid("dose_instances.patient_id", &patient_id)?,
        ));
    }
    Ok(doses)
}

/// A patient's doses for one day in slot-window order.
pub fn list_doses_for_patient_on(
    conn: &Connection,
    patient_id: &Uuid,
    date: &NaiveDate,
) -> Result<Vec<DoseInstance>, DatabaseError> {
    let sql = format!(
        "SELECT {DOSE_COLUMNS} FROM dose_instances
         WHERE patient_id = ?1 AND dose_date = ?2
         ORDER BY window_start, slot"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), fmt_date(date)],
        dose_row_from_rusqlite,
    )?;

    let mut doses = Vec::new();
    for row in rows {
        doses.push(dose_from_row(row?)?);
    }
    Ok(doses)
}

pub fn list_doses_for_prescription(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<DoseInstance>, DatabaseError> {
    let sql = format!(
        "SELECT {DOSE_COLUMNS} FROM dose_instances
         WHERE prescription_id = ?1
         ORDER BY dose_date, window_start"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![prescription_id.to_string()], dose_row_from_rusqlite)?;

    let mut doses = Vec::new();
    for row in rows {
        doses.push(dose_from_row(row?)?);
    }
    Ok(doses)
}

/// Per-day status counts for a patient over [start, end].
pub fn count_dose_statuses(
    conn: &Connection,
    patient_id: &Uuid,
    start: &NaiveDate,
    end: &NaiveDate,
) -> Result<Vec<(NaiveDate, DoseStatus, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT dose_date, status, COUNT(*) FROM dose_instances
         WHERE patient_id = ?1 AND dose_date BETWEEN ?2 AND ?3
         GROUP BY dose_date, status",
    )?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), fmt_date(start), fmt_date(end)],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
            ))
        },
    )?;

    let mut counts = Vec::new();
    for row in rows {
        let (date, status, count) = row?;
        counts.push((
            parse_date("dose_instances.dose_date", &date)?,
            DoseStatus::from_str(&status)?,
            count,
        ));
    }
    Ok(counts)
}

pub fn count_pending_doses_for_prescription(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM dose_instances WHERE prescription_id = ?1 AND status = 'pending'",
        params![prescription_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Drop PENDING doses of a prescription whose window opens after `now`.
pub fn delete_unopened_pending_doses(
    conn: &Connection,
    prescription_id: &Uuid,
    now: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM dose_instances
         WHERE prescription_id = ?1 AND status = 'pending' AND window_start > ?2",
        params![prescription_id.to_string(), fmt_datetime(now)],
    )?;
    Ok(deleted)
}

struct DoseRow {
    id: String,
    order_id: String,
    prescription_id: String,
    patient_id: String,
    dose_date: String,
    slot: String,
    window_start: String,
    window_end: String,
    status: String,
    marked_at: Option<String>,
    marked_by: Option<String>,
    mark_source: Option<String>,
}

fn dose_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<DoseRow> {
    Ok(DoseRow {
        id: row.get(0)?,
        order_id: row.get(1)?,
        prescription_id: row.get(2)?,
        patient_id: row.get(3)?,
        dose_date: row.get(4)?,
        slot: row.get(5)?,
        window_start: row.get(6)?,
        window_end: row.get(7)?,
        status: row.get(8)?,
        marked_at: row.get(9)?,
        marked_by: row.get(10)?,
        mark_source: row.get(11)?,
    })
}

fn dose_from_row(row: DoseRow) -> Result<DoseInstance, DatabaseError> {
    Ok(DoseInstance {
        id: parse_uuid("dose_instances.id", &row.id)?,
        order_id: parse_uuid("dose_instances.order_id", &row.order_id)?,
        prescription_id: parse_uuid("dose_instances.prescription_id", &row.prescription_id)?,
        patient_id: parse_uuid("dose_instances.patient_id", &row.patient_id)?,
        date: parse_date("dose_instances.dose_date", &row.dose_date)?,
        slot: Slot::from_str(&row.slot)?,
        window: DoseWindow {
            start: parse_datetime("dose_instances.window_start", &row.window_start)?,
            end: parse_datetime("dose_instances.window_end", &row.window_end)?,
        },
        status: DoseStatus::from_str(&row.status)?,
        marked_at: parse_opt_datetime("dose_instances.marked_at", row.marked_at)?,
        marked_by: parse_opt_uuid("dose_instances.marked_by", row.marked_by)?,
        mark_source: row
            .mark_source
            .as_deref()
            .map(MarkSource::from_str)
            .transpose()?,
    })
}

/// A patient's doses for one day with medicine and patient display fields.
pub fn list_schedule_rows(
    conn: &Connection,
    patient_id: &Uuid,
    date: &NaiveDate,
) -> Result<Vec<ScheduleRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.patient_id, p.name, d.prescription_id, m.name, o.dosage, d.slot,
                r.meal_relation, d.window_start, d.window_end, d.status,
                d.marked_at, d.marked_by, d.mark_source
         FROM dose_instances d
         JOIN patients p ON p.id = d.patient_id
         JOIN medicine_orders o ON o.id = d.order_id
         JOIN medicines m ON m.id = o.medicine_id
         JOIN time_slot_rules r ON r.order_id = d.order_id AND r.slot = d.slot
         WHERE d.patient_id = ?1 AND d.dose_date = ?2
         ORDER BY d.window_start, m.name",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string(), fmt_date(date)], |row| {
        Ok(ScheduleRowRaw {
            dose_id: row.get(0)?,
            patient_id: row.get(1)?,
            patient_name: row.get(2)?,
            prescription_id: row.get(3)?,
            medicine_name: row.get(4)?,
            dosage: row.get(5)?,
            slot: row.get(6)?,
            meal_relation: row.get(7)?,
            window_start: row.get(8)?,
            window_end: row.get(9)?,
            status: row.get(10)?,
            marked_at: row.get(11)?,
            marked_by: row.get(12)?,
            mark_source: row.get(13)?,
        })
    })?;

    let mut schedule = Vec::new();
    for row in rows {
        let raw = row?;
        schedule.push(ScheduleRow {
            dose_id: parse_uuid("dose_instances.id", &raw.dose_id)?,
            patient_id: parse_uuid("dose_instances.patient_id", &raw.patient_id)?,
            patient_name: raw.patient_name,
            prescription_id: parse_uuid("dose_instances.prescription_id", &raw.prescription_id)?,
            medicine_name: raw.medicine_name,
            dosage: raw.dosage,
            slot: Slot::from_str(&raw.slot)?,
            meal_relation: MealRelation::from_str(&raw.meal_relation)?,
            window: DoseWindow {
                start: parse_datetime("dose_instances.window_start", &raw.window_start)?,
                end: parse_datetime("dose_instances.window_end", &raw.window_end)?,
            },
            status: DoseStatus::from_str(&raw.status)?,
            marked_at: parse_opt_datetime("dose_instances.marked_at", raw.marked_at)?,
            marked_by: parse_opt_uuid("dose_instances.marked_by", raw.marked_by)?,
            mark_source: raw
                .mark_source
                .as_deref()
                .map(MarkSource::from_str)
                .transpose()?,
        });
    }
    Ok(schedule)
}

struct ScheduleRowRaw {
    dose_id: String,
    patient_id: String,
    patient_name: String,
    prescription_id: String,
    medicine_name: String,
    dosage: String,
    slot: String,
    meal_relation: String,
    window_start: String,
    window_end: String,
    status: String,
    marked_at: Option<String>,
    marked_by: Option<String>,
    mark_source: Option<String>,
}

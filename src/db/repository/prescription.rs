use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, fmt_time, parse_date, parse_datetime, parse_opt_datetime, parse_time, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Insert the prescription row, its orders and their slot rules.
///
/// Callers wrap this in a transaction; a failure part-way leaves rows behind
/// otherwise.
pub fn insert_prescription(conn: &Connection, prescription: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, patient_id, doctor_id, remarks, start_date, created_at, status, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            prescription.id.to_string(),
            prescription.patient_id.to_string(),
            prescription.doctor_id.to_string(),
            prescription.remarks,
            fmt_date(&prescription.start_date),
            fmt_datetime(&prescription.created_at),
            prescription.status.as_str(),
            prescription.closed_at.as_ref().map(fmt_datetime),
        ],
    )?;

    for (position, order) in prescription.medicine_orders.iter().enumerate() {
        conn.execute(
            "INSERT INTO medicine_orders (id, prescription_id, medicine_id, dosage, duration_days, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                order.id.to_string(),
                prescription.id.to_string(),
                order.medicine_id.to_string(),
                order.dosage,
                order.duration_days,
                position as i64,
            ],
        )?;

        for rule in &order.time_slots {
            conn.execute(
                "INSERT INTO time_slot_rules (order_id, slot, meal_relation, window_start, window_end)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    order.id.to_string(),
                    rule.slot.as_str(),
                    rule.meal_relation.as_str(),
                    fmt_time(&rule.window_start),
                    fmt_time(&rule.window_end),
                ],
            )?;
        }
    }
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, doctor_id, remarks, start_date, created_at, status, closed_at
         FROM prescriptions WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![id.to_string()], prescription_row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(prescription_from_row(conn, row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Prescribing doctor, without loading orders.
pub fn get_prescription_doctor_id(conn: &Connection, id: &Uuid) -> Result<Option<Uuid>, DatabaseError> {
    let result = conn.query_row(
        "SELECT doctor_id FROM prescriptions WHERE id = ?1",
        params![id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(doctor_id) => Ok(Some(parse_uuid("prescriptions.doctor_id", &doctor_id)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A patient's prescriptions, newest first, optionally filtered by status.
pub fn list_prescriptions_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    status: Option<PrescriptionStatus>,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, doctor_id, remarks, start_date, created_at, status, closed_at
         FROM prescriptions
         WHERE patient_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), status.map(|s| s.as_str())],
        prescription_row_from_rusqlite,
    )?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(conn, row?)?);
    }
    Ok(prescriptions)
}

/// Every prescription in `status`, oldest first.
pub fn list_prescriptions_by_status(
    conn: &Connection,
    status: PrescriptionStatus,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, doctor_id, remarks, start_date, created_at, status, closed_at
         FROM prescriptions WHERE status = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![status.as_str()], prescription_row_from_rusqlite)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(conn, row?)?);
    }
    Ok(prescriptions)
}

/// Compare-and-set on status. Returns false if the row was not in `from`.
pub fn transition_prescription(
    conn: &Connection,
    id: &Uuid,
    from: PrescriptionStatus,
    to: PrescriptionStatus,
    closed_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET status = ?3, closed_at = ?4 WHERE id = ?1 AND status = ?2",
        params![id.to_string(), from.as_str(), to.as_str(), fmt_datetime(closed_at)],
    )?;
    Ok(changed == 1)
}

fn load_orders(conn: &Connection, prescription_id: &str) -> Result<Vec<MedicineOrder>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.medicine_id, m.name, o.dosage, o.duration_days
         FROM medicine_orders o
         JOIN medicines m ON m.id = o.medicine_id
         WHERE o.prescription_id = ?1
         ORDER BY o.position",
    )?;
    let rows = stmt.query_map(params![prescription_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i32>(4)?,
        ))
    })?;

    let mut orders = Vec::new();
    for row in rows {
        let (id, medicine_id, medicine_name, dosage, duration_days) = row?;
        let time_slots = load_slot_rules(conn, &id)?;
        orders.push(MedicineOrder {
            id: parse_uuid("medicine_orders.id", &id)?,
            medicine_id: parse_uuid("medicine_orders.medicine_id", &medicine_id)?,
            medicine_name,
            dosage,
            duration_days,
            time_slots,
        });
    }
    Ok(orders)
}

fn load_slot_rules(conn: &Connection, order_id: &str) -> Result<Vec<TimeSlotRule>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT slot, meal_relation, window_start, window_end
         FROM time_slot_rules WHERE order_id = ?1
         ORDER BY window_start",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut rules = Vec::new();
    for row in rows {
        let (slot, meal_relation, window_start, window_end) = row?;
        rules.push(TimeSlotRule {
            slot: Slot::from_str(&slot)?,
            meal_relation: MealRelation::from_str(&meal_relation)?,
            window_start: parse_time("time_slot_rules.window_start", &window_start)?,
            window_end: parse_time("time_slot_rules.window_end", &window_end)?,
        });
    }
    Ok(rules)
}

struct PrescriptionRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    remarks: Option<String>,
    start_date: String,
    created_at: String,
    status: String,
    closed_at: Option<String>,
}

fn prescription_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        remarks: row.get(3)?,
        start_date: row.get(4)?,
        created_at: row.get(5)?,
        status: row.get(6)?,
        closed_at: row.get(7)?,
    })
}

fn prescription_from_row(conn: &Connection, row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    let medicine_orders = load_orders(conn, &row.id)?;
    Ok(Prescription {
        id: parse_uuid("prescriptions.id", &row.id)?,
        patient_id: parse_uuid("prescriptions.patient_id", &row.patient_id)?,
        doctor_id: parse_uuid("prescriptions.doctor_id", &row.doctor_id)?,
        remarks: row.remarks,
        start_date: parse_date("prescriptions.start_date", &row.start_date)?,
        created_at: parse_datetime("prescriptions.created_at", &row.created_at)?,
        status: PrescriptionStatus::from_str(&row.status)?,
        closed_at: parse_opt_datetime("prescriptions.closed_at", row.closed_at)?,
        medicine_orders,
    })
}

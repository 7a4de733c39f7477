//! Prescription authoring and cancellation.
//!
//! A prescription and all of its orders, slot rules and first horizon of dose
//! instances are written in one transaction under the patient's timeline
//! lock.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use uuid::Uuid;

use crate::core_state::{CoreError, CoreState};
use crate::db::{self, DatabaseError};
use crate::models::enums::{DoctorStatus, MealRelation, PrescriptionStatus, Slot};
use crate::models::{MedicineOrder, Prescription, TimeSlotRule};
use crate::schedule::calendar::{self, CalendarError};

/// Quantity followed by a unit: `650mg`, `2 puffs`, `0.5 tablet`.
static DOSAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?\s*[A-Za-z][A-Za-z ]*$").unwrap());

#[derive(Error, Debug)]
pub enum PrescriptionError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid prescription: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    #[serde(default)]
    pub remarks: Option<String>,
    /// Defaults to the creation day.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    pub medicine_orders: Vec<NewMedicineOrder>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedicineOrder {
    pub medicine_id: Uuid,
    pub dosage: String,
    pub duration_days: i32,
    pub time_slots: Vec<NewTimeSlot>,
}

/// A slot rule; an omitted window falls back to the slot default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeSlot {
    pub slot: Slot,
    pub meal_relation: MealRelation,
    #[serde(default, deserialize_with = "clock_time")]
    pub window_start: Option<NaiveTime>,
    #[serde(default, deserialize_with = "clock_time")]
    pub window_end: Option<NaiveTime>,
}

impl NewTimeSlot {
    fn to_rule(&self) -> Result<TimeSlotRule, PrescriptionError> {
        match (self.window_start, self.window_end) {
            (None, None) => Ok(TimeSlotRule::with_default_window(self.slot, self.meal_relation)),
            (Some(window_start), Some(window_end)) => Ok(TimeSlotRule {
                slot: self.slot,
                meal_relation: self.meal_relation,
                window_start,
                window_end,
            }),
            _ => Err(PrescriptionError::Validation(format!(
                "{} slot needs both windowStart and windowEnd, or neither",
                self.slot
            ))),
        }
    }
}

/// Accepts `HH:MM` or `HH:MM:SS`.
fn clock_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        parse_clock_time(&s)
            .ok_or_else(|| <D::Error as serde::de::Error>::custom(format!("invalid time: {s}")))
    })
    .transpose()
}

pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

pub fn is_valid_dosage(dosage: &str) -> bool {
    DOSAGE_PATTERN.is_match(dosage.trim())
}

// ═══════════════════════════════════════════
// Create
// ═══════════════════════════════════════════

/// Validate and persist a prescription, materializing its first horizon.
pub fn create_prescription(
    conn: &mut Connection,
    input: &NewPrescription,
    now: NaiveDateTime,
    horizon_days: u32,
) -> Result<Prescription, PrescriptionError> {
    let patient = db::get_patient(conn, &input.patient_id)?.ok_or(PrescriptionError::NotFound {
        entity_type: "patient",
        id: input.patient_id,
    })?;
    require_prescriber(conn, &input.doctor_id)?;
    if patient.doctor_id != Some(input.doctor_id) {
        return Err(PrescriptionError::Forbidden(format!(
            "doctor {} is not linked to patient {}",
            input.doctor_id, patient.id
        )));
    }

    if input.medicine_orders.is_empty() {
        return Err(PrescriptionError::Validation(
            "at least one medicine order is required".into(),
        ));
    }
    let start_date = input.start_date.unwrap_or(now.date());
    if start_date < now.date() {
        return Err(PrescriptionError::Validation(format!(
            "start date {start_date} is in the past"
        )));
    }

    let mut medicine_orders = Vec::with_capacity(input.medicine_orders.len());
    for order in &input.medicine_orders {
        medicine_orders.push(build_order(conn, order)?);
    }

    let prescription = Prescription {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        doctor_id: input.doctor_id,
        remarks: input
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from),
        start_date,
        created_at: now,
        status: PrescriptionStatus::Active,
        closed_at: None,
        medicine_orders,
    };

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    db::insert_prescription(&tx, &prescription)?;
    let materialized = calendar::materialize(&tx, &prescription, now.date(), horizon_days)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        prescription_id = %prescription.id,
        patient_id = %prescription.patient_id,
        orders = prescription.medicine_orders.len(),
        materialized,
        "Prescription created"
    );
    Ok(prescription)
}

fn build_order(conn: &Connection, input: &NewMedicineOrder) -> Result<MedicineOrder, PrescriptionError> {
    let medicine = db::get_medicine(conn, &input.medicine_id)?.ok_or(PrescriptionError::NotFound {
        entity_type: "medicine",
        id: input.medicine_id,
    })?;

    let dosage = input.dosage.trim();
    if !is_valid_dosage(dosage) {
        return Err(PrescriptionError::Validation(format!(
            "dosage '{dosage}' must be a quantity followed by a unit"
        )));
    }

    let time_slots = input
        .time_slots
        .iter()
        .map(NewTimeSlot::to_rule)
        .collect::<Result<Vec<_>, _>>()?;

    let order = MedicineOrder {
        id: Uuid::new_v4(),
        medicine_id: medicine.id,
        medicine_name: medicine.name,
        dosage: dosage.to_string(),
        duration_days: input.duration_days,
        time_slots,
    };
    calendar::validate_order(&order)?;
    Ok(order)
}

fn require_prescriber(conn: &Connection, doctor_id: &Uuid) -> Result<(), PrescriptionError> {
    let doctor = db::get_doctor(conn, doctor_id)?.ok_or(PrescriptionError::NotFound {
        entity_type: "doctor",
        id: *doctor_id,
    })?;
    if doctor.status != DoctorStatus::Approved {
        return Err(PrescriptionError::Forbidden(format!(
            "doctor {doctor_id} is not approved"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Read
// ═══════════════════════════════════════════

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Prescription, PrescriptionError> {
    db::get_prescription(conn, id)?.ok_or(PrescriptionError::NotFound {
        entity_type: "prescription",
        id: *id,
    })
}

pub fn list_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    status: Option<PrescriptionStatus>,
) -> Result<Vec<Prescription>, PrescriptionError> {
    if db::get_patient(conn, patient_id)?.is_none() {
        return Err(PrescriptionError::NotFound {
            entity_type: "patient",
            id: *patient_id,
        });
    }
    Ok(db::list_prescriptions_for_patient(conn, patient_id, status)?)
}

// ═══════════════════════════════════════════
// Cancel
// ═══════════════════════════════════════════

/// Cancel an ACTIVE prescription on behalf of its prescribing doctor.
///
/// PENDING doses whose window has not opened are discarded. Doses already
/// open or overdue stay and resolve through marking or the sweep.
pub fn cancel_prescription(
    conn: &mut Connection,
    id: &Uuid,
    doctor_id: &Uuid,
    now: NaiveDateTime,
) -> Result<Prescription, PrescriptionError> {
    let prescription = get_prescription(conn, id)?;
    if prescription.doctor_id != *doctor_id {
        return Err(PrescriptionError::Forbidden(format!(
            "only the prescribing doctor may cancel prescription {id}"
        )));
    }
    require_prescriber(conn, doctor_id)?;
    if prescription.status != PrescriptionStatus::Active {
        return Err(PrescriptionError::Conflict(format!(
            "prescription {id} is {}",
            prescription.status
        )));
    }

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    let changed = db::transition_prescription(
        &tx,
        id,
        PrescriptionStatus::Active,
        PrescriptionStatus::Cancelled,
        &now,
    )?;
    if !changed {
        return Err(PrescriptionError::Conflict(format!(
            "prescription {id} is no longer active"
        )));
    }
    let discarded = db::delete_unopened_pending_doses(&tx, id, &now)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(prescription_id = %id, discarded, "Prescription cancelled");
    get_prescription(conn, id)
}

// ═══════════════════════════════════════════
// Timeline-locked entry points
// ═══════════════════════════════════════════

pub fn create(core: &CoreState, input: &NewPrescription, now: NaiveDateTime) -> Result<Prescription, PrescriptionError> {
    let horizon = core.config().schedule_horizon_days;
    core.with_patient_timeline(&input.patient_id, |conn| {
        create_prescription(conn, input, now, horizon)
    })
}

pub fn cancel(
    core: &CoreState,
    id: &Uuid,
    doctor_id: &Uuid,
    now: NaiveDateTime,
) -> Result<Prescription, PrescriptionError> {
    let patient_id = {
        let conn = core.open_db()?;
        get_prescription(&conn, id)?.patient_id
    };
    core.with_patient_timeline(&patient_id, |conn| cancel_prescription(conn, id, doctor_id, now))
}

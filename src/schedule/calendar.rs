//! Expansion of medicine orders into concrete dose instances.

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::DoseStatus;
use crate::models::{DoseInstance, DoseWindow, MedicineOrder, Prescription};

/// Maximum slots per order: one per [`Slot`](crate::models::enums::Slot).
const MAX_SLOTS_PER_ORDER: usize = 3;

/// Longest course a single order may run.
pub const MAX_DURATION_DAYS: i32 = 366;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Check an order's recurrence without expanding it.
pub fn validate_order(order: &MedicineOrder) -> Result<(), CalendarError> {
    if order.duration_days <= 0 || order.duration_days > MAX_DURATION_DAYS {
        return Err(CalendarError::InvalidRecurrence(format!(
            "duration must be 1 to {MAX_DURATION_DAYS} days, got {}",
            order.duration_days
        )));
    }
    if order.time_slots.is_empty() || order.time_slots.len() > MAX_SLOTS_PER_ORDER {
        return Err(CalendarError::InvalidRecurrence(format!(
            "expected 1 to {MAX_SLOTS_PER_ORDER} time slots, got {}",
            order.time_slots.len()
        )));
    }

    let mut seen = HashSet::new();
    for rule in &order.time_slots {
        if !seen.insert(rule.slot) {
            return Err(CalendarError::InvalidRecurrence(format!(
                "slot {} appears more than once",
                rule.slot
            )));
        }
        if rule.window_start >= rule.window_end {
            return Err(CalendarError::InvalidRecurrence(format!(
                "{} window {}–{} is empty or inverted",
                rule.slot, rule.window_start, rule.window_end
            )));
        }
    }
    Ok(())
}

/// Expand one order into PENDING dose instances ordered by (date, slot).
///
/// Produces `duration_days × slots` instances for the days
/// `[start_date, start_date + duration_days)`. Pure; nothing is persisted.
pub fn expand(
    order: &MedicineOrder,
    prescription_id: Uuid,
    patient_id: Uuid,
    start_date: NaiveDate,
) -> Result<Vec<DoseInstance>, CalendarError> {
    expand_through(order, prescription_id, patient_id, start_date, NaiveDate::MAX)
}

/// Like [`expand`], stopping after `last_day`.
fn expand_through(
    order: &MedicineOrder,
    prescription_id: Uuid,
    patient_id: Uuid,
    start_date: NaiveDate,
    last_day: NaiveDate,
) -> Result<Vec<DoseInstance>, CalendarError> {
    validate_order(order)?;

    let mut rules = order.time_slots.clone();
    rules.sort_by_key(|r| r.slot);

    // Bounded by MAX_DURATION_DAYS after validation.
    let course_days = order.duration_days as u64;
    let past_end = || {
        CalendarError::InvalidRecurrence(format!(
            "course starting {start_date} runs past the last representable date"
        ))
    };
    start_date.checked_add_days(Days::new(course_days)).ok_or_else(past_end)?;

    let days = if last_day < start_date {
        0
    } else {
        course_days.min((last_day - start_date).num_days() as u64 + 1)
    };

    let mut doses = Vec::with_capacity(days as usize * rules.len());
    for offset in 0..days {
        let date = start_date.checked_add_days(Days::new(offset)).ok_or_else(past_end)?;
        for rule in &rules {
            doses.push(DoseInstance {
                id: Uuid::new_v4(),
                order_id: order.id,
                prescription_id,
                patient_id,
                date,
                slot: rule.slot,
                window: DoseWindow {
                    start: date.and_time(rule.window_start),
                    end: date.and_time(rule.window_end),
                },
                status: DoseStatus::Pending,
                marked_at: None,
                marked_by: None,
                mark_source: None,
            });
        }
    }
    Ok(doses)
}

/// Persist every order's expansion up to `as_of + horizon_days`.
///
/// Existing (order, date, slot) rows are left untouched, so calling this
/// again only fills in days that have come inside the horizon. Returns the
/// number of rows inserted.
pub fn materialize(
    conn: &Connection,
    prescription: &Prescription,
    as_of: NaiveDate,
    horizon_days: u32,
) -> Result<usize, CalendarError> {
    let last_day = as_of
        .checked_add_days(Days::new(u64::from(horizon_days)))
        .unwrap_or(NaiveDate::MAX);
    let mut inserted = 0;

    for order in &prescription.medicine_orders {
        let doses = expand_through(
            order,
            prescription.id,
            prescription.patient_id,
            prescription.start_date,
            last_day,
        )?;
        for dose in &doses {
            if db::insert_dose_if_absent(conn, dose)? {
                inserted += 1;
            }
        }
    }

    if inserted > 0 {
        tracing::debug!(
            prescription_id = %prescription.id,
            inserted,
            %last_day,
            "Materialized dose instances"
        );
    }
    Ok(inserted)
}

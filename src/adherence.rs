//! Day-wise adherence rollups, always derived from persisted dose instances.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::{DoseStatus, PatientCondition};

/// Longest range a single report may cover, in days.
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Error, Debug)]
pub enum AdherenceError {
    #[error("Range end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Range {start} to {end} spans more than {MAX_RANGE_DAYS} days")]
    RangeTooLong { start: NaiveDate, end: NaiveDate },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Taken doses over resolved doses, kept unreduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceRatio {
    pub taken: u32,
    pub resolved: u32,
}

impl AdherenceRatio {
    /// `None` when nothing has been resolved.
    pub fn new(taken: u32, resolved: u32) -> Option<Self> {
        (resolved > 0).then_some(Self { taken, resolved })
    }

    /// Percentage rounded half-up, in integer arithmetic.
    pub fn percentage(&self) -> u32 {
        let taken = u64::from(self.taken);
        let resolved = u64::from(self.resolved);
        ((taken * 200 + resolved) / (2 * resolved)) as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub on_time: u32,
    pub late: u32,
    pub missed: u32,
    pub pending: u32,
}

impl StatusCounts {
    fn add(&mut self, status: DoseStatus, count: u32) {
        match status {
            DoseStatus::OnTime => self.on_time += count,
            DoseStatus::Late => self.late += count,
            DoseStatus::Missed => self.missed += count,
            DoseStatus::Pending => self.pending += count,
        }
    }

    fn merge(&mut self, other: &StatusCounts) {
        self.on_time += other.on_time;
        self.late += other.late;
        self.missed += other.missed;
        self.pending += other.pending;
    }

    pub fn total(&self) -> u32 {
        self.on_time + self.late + self.missed + self.pending
    }

    pub fn taken(&self) -> u32 {
        self.on_time + self.late
    }

    pub fn resolved(&self) -> u32 {
        self.taken() + self.missed
    }
}

/// One patient-day. `ratio` and `percentage` stay null while any dose that
/// day is still PENDING, and when the day has no resolved doses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceSnapshot {
    pub patient_id: Uuid,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub ratio: Option<AdherenceRatio>,
    pub percentage: Option<u32>,
}

impl AdherenceSnapshot {
    fn from_counts(patient_id: Uuid, date: NaiveDate, counts: StatusCounts) -> Self {
        let ratio = if counts.pending > 0 {
            None
        } else {
            AdherenceRatio::new(counts.taken(), counts.resolved())
        };
        Self {
            patient_id,
            date,
            counts,
            ratio,
            percentage: ratio.map(|r| r.percentage()),
        }
    }
}

/// Totals over a range. The ratio covers every resolved dose regardless of
/// days that still have pending doses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceSummary {
    pub days: usize,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub ratio: Option<AdherenceRatio>,
    pub percentage: Option<u32>,
}

/// Dashboard row for one of a doctor's patients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientAdherence {
    pub patient_id: Uuid,
    pub name: String,
    pub condition: PatientCondition,
    pub summary: AdherenceSummary,
}

pub fn aggregate(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<AdherenceSnapshot, AdherenceError> {
    let mut snapshots = aggregate_range(conn, patient_id, date, date)?;
    snapshots.pop().ok_or(AdherenceError::InvalidRange {
        start: date,
        end: date,
    })
}

/// One snapshot per day of [start, end], including days without doses.
pub fn aggregate_range(
    conn: &Connection,
    patient_id: &Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<AdherenceSnapshot>, AdherenceError> {
    let days = check_range(start, end)?;
    if db::get_patient(conn, patient_id)?.is_none() {
        return Err(AdherenceError::NotFound {
            entity_type: "patient",
            id: *patient_id,
        });
    }

    let mut by_date: HashMap<NaiveDate, StatusCounts> = HashMap::new();
    for (date, status, count) in db::count_dose_statuses(conn, patient_id, &start, &end)? {
        by_date.entry(date).or_default().add(status, count);
    }

    let snapshots = (0..days)
        .map(|offset| {
            let date = start + Duration::days(offset);
            let counts = by_date.remove(&date).unwrap_or_default();
            AdherenceSnapshot::from_counts(*patient_id, date, counts)
        })
        .collect();
    Ok(snapshots)
}

/// Number of days in [start, end], within `MAX_RANGE_DAYS`.
fn check_range(start: NaiveDate, end: NaiveDate) -> Result<i64, AdherenceError> {
    if end < start {
        return Err(AdherenceError::InvalidRange { start, end });
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(AdherenceError::RangeTooLong { start, end });
    }
    Ok(days)
}

pub fn summarize(snapshots: &[AdherenceSnapshot]) -> AdherenceSummary {
    let mut counts = StatusCounts::default();
    for snapshot in snapshots {
        counts.merge(&snapshot.counts);
    }
    let ratio = AdherenceRatio::new(counts.taken(), counts.resolved());
    AdherenceSummary {
        days: snapshots.len(),
        counts,
        ratio,
        percentage: ratio.map(|r| r.percentage()),
    }
}

/// Every patient linked to a doctor, with their range summary.
pub fn doctor_patient_overview(
    conn: &Connection,
    doctor_id: &Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PatientAdherence>, AdherenceError> {
    check_range(start, end)?;
    if db::get_doctor(conn, doctor_id)?.is_none() {
        return Err(AdherenceError::NotFound {
            entity_type: "doctor",
            id: *doctor_id,
        });
    }

    let mut overview = Vec::new();
    for patient in db::list_patients_by_doctor(conn, doctor_id)? {
        let snapshots = aggregate_range(conn, &patient.id, start, end)?;
        overview.push(PatientAdherence {
            patient_id: patient.id,
            name: patient.name,
            condition: patient.condition,
            summary: summarize(&snapshots),
        });
    }
    Ok(overview)
}

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MealRelation, PrescriptionStatus, Slot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub remarks: Option<String>,
    /// First day of every order's course.
    pub start_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub status: PrescriptionStatus,
    pub closed_at: Option<NaiveDateTime>,
    pub medicine_orders: Vec<MedicineOrder>,
}

impl Prescription {
    /// First day on which no order has a dose left. Saturates at
    /// `NaiveDate::MAX`.
    pub fn end_date(&self) -> NaiveDate {
        let longest = self
            .medicine_orders
            .iter()
            .map(|o| u64::try_from(o.duration_days).unwrap_or(0))
            .max()
            .unwrap_or(0);
        self.start_date
            .checked_add_days(chrono::Days::new(longest))
            .unwrap_or(NaiveDate::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineOrder {
    pub id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub dosage: String,
    pub duration_days: i32,
    pub time_slots: Vec<TimeSlotRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotRule {
    pub slot: Slot,
    pub meal_relation: MealRelation,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
}

impl TimeSlotRule {
    /// Rule using the slot's default window.
    pub fn with_default_window(slot: Slot, meal_relation: MealRelation) -> Self {
        let (window_start, window_end) = slot.default_window();
        Self {
            slot,
            meal_relation,
            window_start,
            window_end,
        }
    }
}

impl Slot {
    /// Window used when a prescription does not specify one.
    pub fn default_window(&self) -> (NaiveTime, NaiveTime) {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        match self {
            Slot::Morning => (hm(7, 0), hm(9, 0)),
            Slot::Afternoon => (hm(12, 0), hm(13, 0)),
            Slot::Night => (hm(21, 0), hm(22, 0)),
        }
    }
}

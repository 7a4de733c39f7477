use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DoseStatus, MarkSource, MealRelation, Slot};

/// Closed interval during which taking the dose counts as on time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DoseWindow {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

/// One concrete scheduled administration of a medicine order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseInstance {
    pub id: Uuid,
    pub order_id: Uuid,
    pub prescription_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub slot: Slot,
    pub window: DoseWindow,
    pub status: DoseStatus,
    pub marked_at: Option<NaiveDateTime>,
    pub marked_by: Option<Uuid>,
    pub mark_source: Option<MarkSource>,
}

/// A dose joined with the display fields a schedule screen needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub dose_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub prescription_id: Uuid,
    pub medicine_name: String,
    pub dosage: String,
    pub slot: Slot,
    pub meal_relation: MealRelation,
    pub window: DoseWindow,
    pub status: DoseStatus,
    pub marked_at: Option<NaiveDateTime>,
    pub marked_by: Option<Uuid>,
    pub mark_source: Option<MarkSource>,
}

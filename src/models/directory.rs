use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AccountStatus, DoctorStatus, LinkRequestStatus, Shift, StaffRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub specialization: Option<String>,
    pub hospital: Option<String>,
    pub status: DoctorStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    pub hospital: Option<String>,
    /// Home shift; a staff member only covers patients on this shift.
    pub shift: Shift,
    pub status: AccountStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
}

/// A patient asking to be linked to a doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: LinkRequestStatus,
    pub created_at: NaiveDateTime,
    pub decided_at: Option<NaiveDateTime>,
}

/// (patient, shift) → staff member responsible for that shift's doses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageAssignment {
    pub patient_id: Uuid,
    pub shift: Shift,
    pub staff_id: Uuid,
    pub assigned_at: NaiveDateTime,
}

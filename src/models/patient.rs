use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AccountStatus, CaretakerKind, PatientCondition};

/// Who marks a STABLE patient's doses.
///
/// One variant is active at a time. CRITICAL patients are always covered by
/// the per-shift staff roster regardless of this setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Caretaker {
    #[serde(rename = "SELF")]
    SelfCare,
    Family {
        actor_id: Uuid,
        name: String,
        phone: String,
    },
    Staff,
}

impl Caretaker {
    pub fn kind(&self) -> CaretakerKind {
        match self {
            Self::SelfCare => CaretakerKind::SelfCare,
            Self::Family { .. } => CaretakerKind::Family,
            Self::Staff => CaretakerKind::Staff,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub caretaker: Caretaker,
    pub condition: PatientCondition,
    pub status: AccountStatus,
    pub created_at: NaiveDateTime,
}

impl Patient {
    /// Doses are marked by the shift roster rather than a single caretaker.
    pub fn uses_shift_coverage(&self) -> bool {
        self.condition == PatientCondition::Critical || self.caretaker == Caretaker::Staff
    }
}

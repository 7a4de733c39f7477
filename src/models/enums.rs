use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// `as_str` is the storage form; serde uses SCREAMING_SNAKE_CASE on the wire.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Slot {
    Morning => "morning",
    Afternoon => "afternoon",
    Night => "night",
});

str_enum!(Shift {
    Morning => "morning",
    Evening => "evening",
    Night => "night",
});

str_enum!(MealRelation {
    Before => "before",
    After => "after",
});

str_enum!(DoseStatus {
    Pending => "pending",
    OnTime => "on_time",
    Late => "late",
    Missed => "missed",
});

str_enum!(MarkSource {
    Caretaker => "caretaker",
    DoctorOverride => "doctor_override",
});

str_enum!(PrescriptionStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(PatientCondition {
    Stable => "stable",
    Critical => "critical",
});

str_enum!(CaretakerKind {
    SelfCare => "self",
    Family => "family",
    Staff => "staff",
});

str_enum!(AccountStatus {
    Active => "active",
    Inactive => "inactive",
});

str_enum!(DoctorStatus {
    Pending => "pending",
    Approved => "approved",
});

str_enum!(StaffRole {
    Nurse => "nurse",
    Assistant => "assistant",
});

str_enum!(LinkRequestStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
});

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Morning, Slot::Afternoon, Slot::Night];
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Evening, Shift::Night];
}

impl DoseStatus {
    /// ON_TIME, LATE and MISSED accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Counts toward adherence as a dose that was taken.
    pub fn is_taken(&self) -> bool {
        matches!(self, Self::OnTime | Self::Late)
    }
}

pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use thiserror::Error;

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Storage format for wall-clock times of day.
pub const TIME_FORMAT: &str = "%H:%M:%S";
/// Storage format for timestamps. Lexicographic order equals time order.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),
}

impl DatabaseError {
    /// True when SQLite rejected the write on a UNIQUE or CHECK constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::ConstraintViolation(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection`; callers decide the
//! transaction and locking scope. Identifiers and timestamps are stored as
//! text and parsed back through the helpers below.

mod audit;
mod coverage;
mod directory;
mod dose;
mod link_request;
mod patient;
mod prescription;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::{DatabaseError, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};

pub use audit::*;
pub use coverage::*;
pub use directory::*;
pub use dose::*;
pub use link_request::*;
pub use patient::*;
pub use prescription::*;

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| invalid(field, value))
}

pub(crate) fn parse_opt_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid(field, value))
}

pub(crate) fn parse_time(field: &str, value: &str) -> Result<NaiveTime, DatabaseError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|_| invalid(field, value))
}

pub(crate) fn parse_datetime(field: &str, value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map_err(|_| invalid(field, value))
}

pub(crate) fn parse_opt_datetime(
    field: &str,
    value: Option<String>,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    value.map(|v| parse_datetime(field, &v)).transpose()
}

pub(crate) fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn fmt_time(time: &NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn fmt_datetime(at: &NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

fn invalid(field: &str, value: &str) -> DatabaseError {
    DatabaseError::InvalidValue {
        field: field.into(),
        value: value.into(),
    }
}

//! Route handlers, one module per resource.

pub mod adherence;
pub mod coverage;
pub mod doctors;
pub mod doses;
pub mod health;
pub mod link_requests;
pub mod medicines;
pub mod overview;
pub mod patients;
pub mod prescriptions;
pub mod schedule;
pub mod staff;

//! Seeding helpers shared by the in-crate test modules.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core_state::CoreState;
use crate::db;
use crate::models::enums::{
    AccountStatus, DoctorStatus, MealRelation, PatientCondition, PrescriptionStatus, Shift, Slot,
    StaffRole,
};
use crate::models::{
    Caretaker, CoverageAssignment, Doctor, Medicine, MedicineOrder, Patient, Prescription, Staff,
    TimeSlotRule,
};

/// Day `n` of March 2026.
pub fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, n).unwrap()
}

pub fn at(n: u32, hour: u32, minute: u32) -> NaiveDateTime {
    day(n).and_hms_opt(hour, minute, 0).unwrap()
}

fn unique_email(name: &str) -> String {
    let local: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    format!("{local}.{}@example.test", Uuid::new_v4().simple())
}

pub fn seed_patient(conn: &Connection, name: &str) -> Patient {
    let patient = Patient {
        id: Uuid::new_v4(),
        name: name.into(),
        email: unique_email(name),
        age: Some(54),
        gender: None,
        blood_group: None,
        phone: None,
        emergency_contact: None,
        doctor_id: None,
        caretaker: Caretaker::SelfCare,
        condition: PatientCondition::Stable,
        status: AccountStatus::Active,
        created_at: at(1, 0, 0),
    };
    db::insert_patient(conn, &patient).unwrap();
    patient
}

pub fn seed_doctor(conn: &Connection, name: &str) -> Doctor {
    let doctor = Doctor {
        id: Uuid::new_v4(),
        name: name.into(),
        email: unique_email(name),
        specialization: Some("General Medicine".into()),
        hospital: None,
        status: DoctorStatus::Approved,
        created_at: at(1, 0, 0),
    };
    db::insert_doctor(conn, &doctor).unwrap();
    doctor
}

pub fn seed_staff(conn: &Connection, name: &str, shift: Shift) -> Staff {
    let staff = Staff {
        id: Uuid::new_v4(),
        name: name.into(),
        email: unique_email(name),
        role: StaffRole::Nurse,
        hospital: None,
        shift,
        status: AccountStatus::Active,
        created_at: at(1, 0, 0),
    };
    db::insert_staff(conn, &staff).unwrap();
    staff
}

pub fn seed_medicine(conn: &Connection, name: &str) -> Medicine {
    let medicine = Medicine {
        id: Uuid::new_v4(),
        name: name.into(),
    };
    db::insert_medicine(conn, &medicine).unwrap();
    medicine
}

pub fn assign(conn: &Connection, patient_id: &Uuid, shift: Shift, staff_id: &Uuid) {
    db::upsert_coverage(
        conn,
        &CoverageAssignment {
            patient_id: *patient_id,
            shift,
            staff_id: *staff_id,
            assigned_at: at(1, 0, 0),
        },
    )
    .unwrap();
}

/// One fresh staff member per shift, in `Shift::ALL` order.
pub fn cover_all_shifts(conn: &Connection, patient_id: &Uuid) -> Vec<Staff> {
    Shift::ALL
        .iter()
        .map(|shift| {
            let staff = seed_staff(conn, &format!("Nurse {shift}"), *shift);
            assign(conn, patient_id, *shift, &staff.id);
            staff
        })
        .collect()
}

pub struct Fixture {
    pub patient: Patient,
    pub doctor: Doctor,
    pub medicine: Medicine,
    pub prescription: Prescription,
}

/// Linked patient and doctor with one stored ACTIVE prescription of
/// "Dolo 650" at default windows. No doses are materialized.
pub fn seed_prescription(conn: &Connection, start_date: NaiveDate, days: i32, slots: &[Slot]) -> Fixture {
    let rules = slots
        .iter()
        .map(|slot| TimeSlotRule::with_default_window(*slot, MealRelation::After))
        .collect();
    seed_prescription_with(conn, start_date, days, rules)
}

pub fn seed_prescription_with(
    conn: &Connection,
    start_date: NaiveDate,
    days: i32,
    time_slots: Vec<TimeSlotRule>,
) -> Fixture {
    let mut patient = seed_patient(conn, "Asha");
    let doctor = seed_doctor(conn, "Dr. Rao");
    db::update_patient_doctor(conn, &patient.id, &doctor.id).unwrap();
    patient.doctor_id = Some(doctor.id);

    let medicine = match db::get_medicine_by_name(conn, "Dolo 650").unwrap() {
        Some(existing) => existing,
        None => seed_medicine(conn, "Dolo 650"),
    };
    let prescription = Prescription {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        doctor_id: doctor.id,
        remarks: None,
        start_date,
        created_at: start_date.and_hms_opt(6, 0, 0).unwrap(),
        status: PrescriptionStatus::Active,
        closed_at: None,
        medicine_orders: vec![MedicineOrder {
            id: Uuid::new_v4(),
            medicine_id: medicine.id,
            medicine_name: medicine.name.clone(),
            dosage: "650mg".into(),
            duration_days: days,
            time_slots,
        }],
    };
    db::insert_prescription(conn, &prescription).unwrap();

    Fixture {
        patient,
        doctor,
        medicine,
        prescription,
    }
}

/// File-backed `CoreState` with default configuration.
pub fn test_core() -> (tempfile::TempDir, CoreState) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        db_path: Some(dir.path().join("medtrack.db")),
        ..EngineConfig::default()
    };
    let core = CoreState::new(config).unwrap();
    (dir, core)
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use patient_cell::{Patient, Sex, PATIENTS};
use shared_database::{to_document, MemoryStore, RecordStore};
use shared_models::auth::Role;
use staff_cell::{StaffMember, STAFF};

use crate::models::{Booking, BookingKind, BookingStatus};

/// Inserts a staff record directly, skipping password hashing.
pub async fn seed_staff(store: &MemoryStore, role: Role) -> Uuid {
    let now = Utc::now();
    let id = Uuid::new_v4();
    let member = StaffMember {
        id,
        first_name: "Test".to_string(),
        last_name: format!("{}", role),
        role,
        department: None,
        phone: None,
        email: format!("{}@hopital.test", id),
        password_hash: "not-a-real-hash".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store
        .insert(STAFF, to_document(&member).unwrap())
        .await
        .unwrap();
    id
}

pub async fn seed_patient(store: &MemoryStore) -> Uuid {
    let now = Utc::now();
    let patient = Patient {
        id: Uuid::new_v4(),
        first_name: "Awa".to_string(),
        last_name: "Ndiaye".to_string(),
        date_of_birth: chrono::NaiveDate::from_ymd_opt(1985, 7, 19).unwrap(),
        sex: Sex::Female,
        address: None,
        phone: None,
        medical_history: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store
        .insert(PATIENTS, to_document(&patient).unwrap())
        .await
        .unwrap();
    patient.id
}

pub fn booking_doc(staff_id: Uuid, start_time: DateTime<Utc>, duration_minutes: i64, status: BookingStatus) -> Booking {
    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        kind: BookingKind::Appointment,
        patient_id: Uuid::new_v4(),
        staff_id,
        start_time,
        duration_minutes,
        status,
        reason: Some("Contrôle".to_string()),
        diagnosis: None,
        treatment: None,
        notes: None,
        created_by: Uuid::new_v4(),
        updated_by: None,
        cancellation_reason: None,
        cancelled_by: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    }
}

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use patient_cell::PatientError;
use shared_database::StoreError;
use shared_models::auth::Role;
use shared_models::error::AppError;
use staff_cell::StaffError;

/// Appointments and consultations share one collection so the
/// double-booking check covers both kinds.
pub const BOOKINGS: &str = "bookings";

pub const DEFAULT_DURATION_MINUTES: i64 = 30;

// ==============================================================================
// BOOKING KIND & STATUS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    #[serde(alias = "rendezvous")]
    Appointment,
    Consultation,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::Appointment => "appointment",
            BookingKind::Consultation => "consultation",
        }
    }

    /// Inclusive bounds on `duration_minutes`.
    pub fn duration_bounds(&self) -> (i64, i64) {
        match self {
            BookingKind::Appointment => (5, 240),
            BookingKind::Consultation => (15, 120),
        }
    }

    pub fn accepts_role(&self, role: Role) -> bool {
        match self {
            BookingKind::Appointment => true,
            BookingKind::Consultation => role.is_clinical(),
        }
    }

    pub fn uses_in_progress(&self) -> bool {
        matches!(self, BookingKind::Consultation)
    }
}

impl fmt::Display for BookingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest booking of any kind. Bounds the look-back window of the
/// conflict query.
pub const MAX_DURATION_MINUTES: i64 = 240;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[serde(alias = "prevu", alias = "prévu", alias = "planifie", alias = "planifié")]
    Planned,
    #[serde(alias = "confirme", alias = "confirmé")]
    Confirmed,
    #[serde(alias = "en_cours")]
    InProgress,
    #[serde(alias = "termine", alias = "terminé")]
    Completed,
    #[serde(alias = "annule", alias = "annulé")]
    Cancelled,
    #[serde(alias = "absent")]
    NoShow,
}

impl BookingStatus {
    /// Whether a booking in this status occupies the staff member's time.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::NoShow)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Planned => "planned",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// BOOKING RECORD
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub kind: BookingKind,
    pub patient_id: Uuid,
    pub staff_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub reason: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }

    /// Half-open interval overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.start_time, self.end_time(), start, end)
    }
}

pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Booking as returned over HTTP, with the derived end time.
#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    pub booking: Booking,
    pub end_time: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        let end_time = booking.end_time();
        Self { booking, end_time }
    }
}

// ==============================================================================
// REQUESTS & QUERIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub patient_id: Uuid,
    pub staff_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    #[serde(alias = "motif")]
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleBookingRequest {
    pub start_time: DateTime<Utc>,
    pub staff_id: Option<Uuid>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookingDetailsRequest {
    #[serde(alias = "motif")]
    pub reason: Option<String>,
    #[serde(alias = "diagnostic")]
    pub diagnosis: Option<String>,
    #[serde(alias = "traitement")]
    pub treatment: Option<String>,
    #[serde(alias = "remarques")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingQuery {
    pub staff_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckQuery {
    pub staff_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub exclude_booking_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_booking_ids: Vec<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Booking {0} not found")]
    NotFound(Uuid),

    #[error("Patient {0} not found")]
    PatientNotFound(Uuid),

    #[error("Staff member {0} not found")]
    StaffNotFound(Uuid),

    #[error("Staff member {staff_id} with role {role} cannot take a {kind}")]
    StaffNotEligible {
        staff_id: Uuid,
        role: Role,
        kind: BookingKind,
    },

    #[error("Time slot conflicts with booking {conflicting_id}")]
    Conflict { conflicting_id: Uuid },

    #[error("Cannot move a {kind} from {from} to {to}")]
    InvalidStatusTransition {
        kind: BookingKind,
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::Store(err) if err.is_transient())
    }
}

impl From<PatientError> for BookingError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(id) => BookingError::PatientNotFound(id),
            PatientError::Validation(msg) => BookingError::Validation(msg),
            PatientError::Store(err) => BookingError::Store(err),
        }
    }
}

impl From<StaffError> for BookingError {
    fn from(err: StaffError) -> Self {
        match err {
            StaffError::NotFound(id) => BookingError::StaffNotFound(id),
            StaffError::Store(err) => BookingError::Store(err),
            other => BookingError::Validation(other.to_string()),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            err @ (BookingError::StaffNotEligible { .. } | BookingError::InvalidStatusTransition { .. }) => {
                AppError::ValidationError(err.to_string())
            }
            err @ (BookingError::NotFound(_)
            | BookingError::PatientNotFound(_)
            | BookingError::StaffNotFound(_)) => AppError::NotFound(err.to_string()),
            BookingError::Conflict { conflicting_id } => AppError::SlotTaken {
                conflicting_booking_id: conflicting_id,
            },
            BookingError::Store(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, hour, minute, 0).unwrap()
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!intervals_overlap(at(9, 0), at(9, 30), at(9, 30), at(10, 0)));
        assert!(!intervals_overlap(at(9, 30), at(10, 0), at(9, 0), at(9, 30)));
        assert!(intervals_overlap(at(9, 0), at(9, 30), at(9, 15), at(9, 45)));
        assert!(intervals_overlap(at(9, 0), at(10, 0), at(9, 15), at(9, 30)));
    }

    #[test]
    fn french_status_names_are_accepted() {
        let planned: BookingStatus = serde_json::from_str("\"prévu\"").unwrap();
        let cancelled: BookingStatus = serde_json::from_str("\"annulé\"").unwrap();

        assert_eq!(planned, BookingStatus::Planned);
        assert_eq!(cancelled, BookingStatus::Cancelled);
        assert_eq!(serde_json::to_string(&BookingStatus::NoShow).unwrap(), "\"no_show\"");
    }

    #[test]
    fn only_cancelled_and_no_show_free_the_slot() {
        assert!(BookingStatus::Planned.blocks_slot());
        assert!(BookingStatus::Completed.blocks_slot());
        assert!(!BookingStatus::Cancelled.blocks_slot());
        assert!(!BookingStatus::NoShow.blocks_slot());
    }

    #[test]
    fn conflict_maps_to_slot_taken() {
        let id = Uuid::new_v4();
        match AppError::from(BookingError::Conflict { conflicting_id: id }) {
            AppError::SlotTaken { conflicting_booking_id } => assert_eq!(conflicting_booking_id, id),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn consultations_need_clinical_staff() {
        assert!(BookingKind::Consultation.accepts_role(Role::Nurse));
        assert!(!BookingKind::Consultation.accepts_role(Role::Secretary));
        assert!(BookingKind::Appointment.accepts_role(Role::Secretary));
    }
}

use tracing::{debug, warn};

use crate::models::{BookingError, BookingKind, BookingStatus};

/// Status state machine shared by appointments and consultations.
///
/// `planned -> confirmed -> in_progress -> completed`, where appointments go
/// straight from `confirmed` to `completed`. `cancelled` and `no_show` are
/// reachable from any non-terminal state; `no_show` only leads to
/// `cancelled`.
pub struct BookingLifecycle;

impl BookingLifecycle {
    pub fn allowed_transitions(kind: BookingKind, from: BookingStatus) -> &'static [BookingStatus] {
        use crate::models::BookingStatus::*;

        match (kind, from) {
            (_, Planned) => &[Confirmed, Cancelled, NoShow],
            (BookingKind::Appointment, Confirmed) => &[Completed, Cancelled, NoShow],
            (BookingKind::Consultation, Confirmed) => &[InProgress, Cancelled, NoShow],
            (_, InProgress) => &[Completed, Cancelled, NoShow],
            (_, NoShow) => &[Cancelled],
            (_, Completed) | (_, Cancelled) => &[],
        }
    }

    pub fn validate_transition(
        kind: BookingKind,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating {} transition {} -> {}", kind, from, to);

        if to == BookingStatus::InProgress && !kind.uses_in_progress() {
            warn!("Rejected in_progress for a {}", kind);
            return Err(BookingError::InvalidStatusTransition { kind, from, to });
        }

        if !Self::allowed_transitions(kind, from).contains(&to) {
            warn!("Invalid status transition attempted: {} -> {}", from, to);
            return Err(BookingError::InvalidStatusTransition { kind, from, to });
        }

        Ok(())
    }

    /// Only bookings that have not started may move in time.
    pub fn can_reschedule(status: BookingStatus) -> bool {
        matches!(status, BookingStatus::Planned | BookingStatus::Confirmed)
    }
}

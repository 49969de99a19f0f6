use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{from_documents, Filter, RecordStore, SortOrder};
use staff_cell::{StaffMember, StaffService};

use crate::models::{Booking, BookingError, BookingKind, BookingStatus, BOOKINGS, MAX_DURATION_MINUTES};

/// How far ahead each kind of booking may be placed.
#[derive(Debug, Clone, Copy)]
pub struct SchedulingPolicy {
    pub appointment_horizon: Duration,
    pub consultation_horizon: Duration,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            appointment_horizon: Duration::days(365),
            consultation_horizon: Duration::days(365),
        }
    }
}

impl SchedulingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            appointment_horizon: Duration::days(config.appointment_horizon_days),
            consultation_horizon: Duration::days(config.consultation_horizon_days),
        }
    }

    pub fn horizon(&self, kind: BookingKind) -> Duration {
        match kind {
            BookingKind::Appointment => self.appointment_horizon,
            BookingKind::Consultation => self.consultation_horizon,
        }
    }
}

/// Enforces that no staff member holds two overlapping active bookings.
///
/// The guard only reads. Callers must hold the staff member's scheduling
/// lock around [`check_conflict`](Self::check_conflict) and the write that
/// follows it.
pub struct SchedulingGuard {
    store: Arc<dyn RecordStore>,
    staff: StaffService,
    policy: SchedulingPolicy,
}

impl SchedulingGuard {
    pub fn new(store: Arc<dyn RecordStore>, policy: SchedulingPolicy) -> Self {
        // Staff lookups here never take a lock.
        let staff = StaffService::new(store.clone(), StdDuration::ZERO);
        Self { store, staff, policy }
    }

    /// Checks duration bounds and, when the start moved, that it lies in the
    /// future and inside the horizon.
    pub fn validate_window(
        &self,
        kind: BookingKind,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        now: DateTime<Utc>,
        start_changed: bool,
    ) -> Result<(), BookingError> {
        let (min, max) = kind.duration_bounds();
        if duration_minutes < min || duration_minutes > max {
            return Err(BookingError::Validation(format!(
                "A {} must last between {} and {} minutes (got {})",
                kind, min, max, duration_minutes
            )));
        }

        if start_changed {
            if start_time <= now {
                return Err(BookingError::Validation(format!(
                    "A {} must start in the future",
                    kind
                )));
            }
            let horizon = self.policy.horizon(kind);
            if start_time > now + horizon {
                return Err(BookingError::Validation(format!(
                    "A {} cannot be booked more than {} days ahead",
                    kind,
                    horizon.num_days()
                )));
            }
        }

        Ok(())
    }

    /// Inactive staff are treated as missing.
    pub async fn ensure_staff_eligible(
        &self,
        kind: BookingKind,
        staff_id: Uuid,
    ) -> Result<StaffMember, BookingError> {
        let member = self.staff.get(staff_id).await?;

        if !member.is_active {
            debug!("Staff member {} is inactive", staff_id);
            return Err(BookingError::StaffNotFound(staff_id));
        }
        if !kind.accepts_role(member.role) {
            return Err(BookingError::StaffNotEligible {
                staff_id,
                role: member.role,
                kind,
            });
        }

        Ok(member)
    }

    /// Returns the earliest active booking of `staff_id` overlapping
    /// `[start_time, start_time + duration)`, ignoring `exclude`.
    pub async fn check_conflict(
        &self,
        staff_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, BookingError> {
        let conflicts = self
            .find_conflicts(staff_id, start_time, duration_minutes, exclude)
            .await?;

        match conflicts.first() {
            Some(existing) => {
                warn!(
                    "Conflict detected for staff {}: booking {} at {}",
                    staff_id, existing.id, existing.start_time
                );
                Ok(Some(existing.id))
            }
            None => Ok(None),
        }
    }

    /// All active bookings of `staff_id` overlapping the interval, earliest first.
    pub async fn find_conflicts(
        &self,
        staff_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Booking>, BookingError> {
        let end_time = start_time + Duration::minutes(duration_minutes);
        debug!("Checking conflicts for staff {} from {} to {}", staff_id, start_time, end_time);

        // Anything starting at or before this bound ends by `start_time` at the latest.
        let earliest_relevant_start = start_time - Duration::minutes(MAX_DURATION_MINUTES);

        let mut filter = Filter::new()
            .eq("staff_id", staff_id)
            .not_in("status", [BookingStatus::Cancelled, BookingStatus::NoShow])
            .lt("start_time", end_time)
            .gt("start_time", earliest_relevant_start)
            .order_by("start_time", SortOrder::Asc);
        if let Some(exclude_id) = exclude {
            filter = filter.ne("id", exclude_id);
        }

        let candidates: Vec<Booking> = from_documents(self.store.find(BOOKINGS, &filter).await?)?;

        Ok(candidates
            .into_iter()
            .filter(|existing| {
                existing.status.blocks_slot()
                    && Some(existing.id) != exclude
                    && existing.overlaps(start_time, end_time)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use shared_database::{to_document, MemoryStore};
    use shared_models::auth::Role;

    use crate::services::test_support::{booking_doc, seed_staff};

    fn guard(store: Arc<MemoryStore>) -> SchedulingGuard {
        SchedulingGuard::new(store, SchedulingPolicy::default())
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 3, hour, minute, 0).unwrap()
    }

    #[test]
    fn duration_bounds_follow_kind() {
        let guard = guard(Arc::new(MemoryStore::new()));
        let now = at(8, 0);

        assert!(guard.validate_window(BookingKind::Appointment, at(9, 0), 5, now, true).is_ok());
        assert!(guard.validate_window(BookingKind::Appointment, at(9, 0), 240, now, true).is_ok());
        assert!(guard.validate_window(BookingKind::Appointment, at(9, 0), 241, now, true).is_err());
        assert!(guard.validate_window(BookingKind::Consultation, at(9, 0), 10, now, true).is_err());
        assert!(guard.validate_window(BookingKind::Consultation, at(9, 0), 121, now, true).is_err());
    }

    #[test]
    fn start_must_be_future_and_inside_horizon() {
        let guard = guard(Arc::new(MemoryStore::new()));
        let now = at(10, 0);

        assert_matches!(
            guard.validate_window(BookingKind::Appointment, at(10, 0), 30, now, true),
            Err(BookingError::Validation(_))
        );
        assert_matches!(
            guard.validate_window(BookingKind::Consultation, now + Duration::days(366), 30, now, true),
            Err(BookingError::Validation(_))
        );
        assert!(guard
            .validate_window(BookingKind::Consultation, now + Duration::days(365), 30, now, true)
            .is_ok());
    }

    #[test]
    fn unchanged_start_skips_time_checks() {
        let guard = guard(Arc::new(MemoryStore::new()));
        let now = at(12, 0);

        assert!(guard.validate_window(BookingKind::Appointment, at(9, 0), 30, now, false).is_ok());
    }

    #[tokio::test]
    async fn overlap_is_half_open() {
        let store = Arc::new(MemoryStore::new());
        let staff = seed_staff(&store, Role::Doctor).await;
        let existing = booking_doc(staff, at(9, 0), 30, BookingStatus::Confirmed);
        store.insert(BOOKINGS, to_document(&existing).unwrap()).await.unwrap();
        let guard = guard(store);

        assert_eq!(guard.check_conflict(staff, at(9, 15), 30, None).await.unwrap(), Some(existing.id));
        assert_eq!(guard.check_conflict(staff, at(8, 45), 30, None).await.unwrap(), Some(existing.id));
        assert_eq!(guard.check_conflict(staff, at(9, 30), 30, None).await.unwrap(), None);
        assert_eq!(guard.check_conflict(staff, at(8, 30), 30, None).await.unwrap(), None);
        assert_eq!(
            guard.check_conflict(staff, at(9, 0), 30, Some(existing.id)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn long_earlier_booking_is_found() {
        let store = Arc::new(MemoryStore::new());
        let staff = seed_staff(&store, Role::Doctor).await;
        let long = booking_doc(staff, at(8, 0), 240, BookingStatus::Planned);
        store.insert(BOOKINGS, to_document(&long).unwrap()).await.unwrap();
        let guard = guard(store);

        assert_eq!(guard.check_conflict(staff, at(11, 55), 15, None).await.unwrap(), Some(long.id));
        assert_eq!(guard.check_conflict(staff, at(12, 0), 15, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_and_no_show_do_not_block() {
        let store = Arc::new(MemoryStore::new());
        let staff = seed_staff(&store, Role::Nurse).await;
        for status in [BookingStatus::Cancelled, BookingStatus::NoShow] {
            let doc = booking_doc(staff, at(9, 0), 30, status);
            store.insert(BOOKINGS, to_document(&doc).unwrap()).await.unwrap();
        }

        assert_eq!(guard(store).check_conflict(staff, at(9, 0), 30, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn other_staff_bookings_are_ignored_and_earliest_wins() {
        let store = Arc::new(MemoryStore::new());
        let staff = seed_staff(&store, Role::Doctor).await;
        let other = seed_staff(&store, Role::Doctor).await;

        let later = booking_doc(staff, at(10, 0), 30, BookingStatus::Planned);
        let earlier = booking_doc(staff, at(9, 30), 30, BookingStatus::Planned);
        let foreign = booking_doc(other, at(9, 0), 120, BookingStatus::Planned);
        for doc in [&later, &earlier, &foreign] {
            store.insert(BOOKINGS, to_document(doc).unwrap()).await.unwrap();
        }
        let guard = guard(store);

        let conflicts = guard.find_conflicts(staff, at(9, 0), 120, None).await.unwrap();
        let ids: Vec<Uuid> = conflicts.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
        assert_eq!(guard.check_conflict(staff, at(9, 0), 120, None).await.unwrap(), Some(earlier.id));
    }

    #[tokio::test]
    async fn eligibility_depends_on_role_and_activity() {
        let store = Arc::new(MemoryStore::new());
        let secretary = seed_staff(&store, Role::Secretary).await;
        let nurse = seed_staff(&store, Role::Nurse).await;
        let guard = guard(store.clone());

        assert!(guard.ensure_staff_eligible(BookingKind::Appointment, secretary).await.is_ok());
        assert_matches!(
            guard.ensure_staff_eligible(BookingKind::Consultation, secretary).await,
            Err(BookingError::StaffNotEligible { role: Role::Secretary, .. })
        );
        assert!(guard.ensure_staff_eligible(BookingKind::Consultation, nurse).await.is_ok());

        store
            .update_by_id(staff_cell::STAFF, nurse, serde_json::json!({ "is_active": false }))
            .await
            .unwrap();
        assert_matches!(
            guard.ensure_staff_eligible(BookingKind::Consultation, nurse).await,
            Err(BookingError::StaffNotFound(id)) if id == nurse
        );

        let missing = Uuid::new_v4();
        assert_matches!(
            guard.ensure_staff_eligible(BookingKind::Appointment, missing).await,
            Err(BookingError::StaffNotFound(id)) if id == missing
        );
    }
}

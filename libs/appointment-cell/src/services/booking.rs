use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use patient_cell::PatientService;
use shared_database::{from_document, from_documents, to_document, Filter, RecordStore, SortOrder};
use shared_utils::AppState;

use crate::models::{
    Booking, BookingError, BookingKind, BookingQuery, BookingStatus, ConflictCheckQuery,
    ConflictCheckResponse, CreateBookingRequest, RescheduleBookingRequest, UpdateBookingDetailsRequest,
    BOOKINGS, DEFAULT_DURATION_MINUTES, MAX_DURATION_MINUTES,
};
use crate::services::conflict::{SchedulingGuard, SchedulingPolicy};
use crate::services::lifecycle::BookingLifecycle;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Owns every write to the bookings collection.
///
/// Writes that place a booking in time run under the per-staff scheduling
/// lock (`staff:{id}`) so the conflict check and the write are serialized
/// against other bookers of the same staff member.
pub struct BookingService {
    store: Arc<dyn RecordStore>,
    guard: SchedulingGuard,
    patients: PatientService,
    lock_wait: StdDuration,
}

impl BookingService {
    pub fn new(store: Arc<dyn RecordStore>, policy: SchedulingPolicy, lock_wait: StdDuration) -> Self {
        Self {
            guard: SchedulingGuard::new(store.clone(), policy),
            patients: PatientService::new(store.clone()),
            store,
            lock_wait,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            SchedulingPolicy::from_config(&state.config),
            state.lock_wait(),
        )
    }

    pub fn guard(&self) -> &SchedulingGuard {
        &self.guard
    }

    #[instrument(skip(self, request), fields(staff_id = %request.staff_id, start = %request.start_time))]
    pub async fn create(
        &self,
        kind: BookingKind,
        request: CreateBookingRequest,
        actor_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let duration_minutes = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        let reason = non_blank(request.reason);
        if kind == BookingKind::Appointment && reason.is_none() {
            return Err(BookingError::Validation("An appointment requires a reason".to_string()));
        }

        let now = Utc::now();
        self.guard
            .validate_window(kind, request.start_time, duration_minutes, now, true)?;
        self.patients.get_active_patient(request.patient_id).await?;
        self.guard.ensure_staff_eligible(kind, request.staff_id).await?;

        let booking = Booking {
            id: Uuid::new_v4(),
            kind,
            patient_id: request.patient_id,
            staff_id: request.staff_id,
            start_time: request.start_time,
            duration_minutes,
            status: BookingStatus::Planned,
            reason,
            diagnosis: None,
            treatment: None,
            notes: non_blank(request.notes),
            created_by: actor_id,
            updated_by: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .with_staff_lock(booking.staff_id, || self.insert_if_free(&booking))
            .await?;

        info!("{} {} booked for staff {}", kind, created.id, created.staff_id);
        Ok(created)
    }

    async fn insert_if_free(&self, booking: &Booking) -> Result<Booking, BookingError> {
        if let Some(conflicting_id) = self
            .guard
            .check_conflict(booking.staff_id, booking.start_time, booking.duration_minutes, None)
            .await?
        {
            return Err(BookingError::Conflict { conflicting_id });
        }

        let stored = self.store.insert(BOOKINGS, to_document(booking)?).await?;
        Ok(from_document(stored)?)
    }

    #[instrument(skip(self, request))]
    pub async fn reschedule(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        request: RescheduleBookingRequest,
        actor_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let current = self.get(kind, booking_id).await?;
        if !BookingLifecycle::can_reschedule(current.status) {
            return Err(BookingError::Validation(format!(
                "A {} {} booking cannot be rescheduled",
                current.status, kind
            )));
        }

        let staff_id = request.staff_id.unwrap_or(current.staff_id);
        let duration_minutes = request.duration_minutes.unwrap_or(current.duration_minutes);
        let start_changed = request.start_time != current.start_time;
        let staff_changed = staff_id != current.staff_id;
        let duration_changed = duration_minutes != current.duration_minutes;

        if !(start_changed || staff_changed || duration_changed) {
            debug!("Reschedule of {} changes nothing", booking_id);
            return Ok(current);
        }

        self.guard.validate_window(
            kind,
            request.start_time,
            duration_minutes,
            Utc::now(),
            start_changed,
        )?;
        if staff_changed {
            self.guard.ensure_staff_eligible(kind, staff_id).await?;
        }

        let mut patch = Map::new();
        patch.insert("start_time".into(), json!(request.start_time));
        patch.insert("staff_id".into(), json!(staff_id));
        patch.insert("duration_minutes".into(), json!(duration_minutes));
        patch.insert("updated_by".into(), json!(actor_id));
        patch.insert("updated_at".into(), json!(Utc::now()));

        let updated = self
            .with_staff_lock(staff_id, || {
                self.move_if_free(booking_id, staff_id, request.start_time, duration_minutes, patch)
            })
            .await?;

        info!("{} {} rescheduled to {}", kind, booking_id, updated.start_time);
        Ok(updated)
    }

    async fn move_if_free(
        &self,
        booking_id: Uuid,
        staff_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        patch: Map<String, Value>,
    ) -> Result<Booking, BookingError> {
        if let Some(conflicting_id) = self
            .guard
            .check_conflict(staff_id, start_time, duration_minutes, Some(booking_id))
            .await?
        {
            return Err(BookingError::Conflict { conflicting_id });
        }

        let updated = self
            .store
            .update_by_id(BOOKINGS, booking_id, Value::Object(patch))
            .await?;
        Ok(from_document(updated)?)
    }

    /// Cancelling an already cancelled booking returns it unchanged.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        reason: Option<String>,
        actor_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let current = self.get(kind, booking_id).await?;
        if current.status == BookingStatus::Cancelled {
            debug!("{} {} already cancelled", kind, booking_id);
            return Ok(current);
        }
        BookingLifecycle::validate_transition(kind, current.status, BookingStatus::Cancelled)?;

        let now = Utc::now();
        let patch = json!({
            "status": BookingStatus::Cancelled,
            "cancellation_reason": non_blank(reason),
            "cancelled_by": actor_id,
            "cancelled_at": now,
            "updated_by": actor_id,
            "updated_at": now,
        });

        let updated = self.store.update_by_id(BOOKINGS, booking_id, patch).await?;
        info!("{} {} cancelled by {}", kind, booking_id, actor_id);
        Ok(from_document(updated)?)
    }

    /// Moves a booking along its state machine. No transition makes a
    /// booking occupy time it did not already occupy, so no conflict check
    /// is needed here.
    #[instrument(skip(self, diagnosis))]
    pub async fn transition(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        new_status: BookingStatus,
        diagnosis: Option<String>,
        actor_id: Uuid,
    ) -> Result<Booking, BookingError> {
        if new_status == BookingStatus::Cancelled {
            return self.cancel(kind, booking_id, None, actor_id).await;
        }

        let current = self.get(kind, booking_id).await?;
        BookingLifecycle::validate_transition(kind, current.status, new_status)?;

        let diagnosis = non_blank(diagnosis);
        if kind == BookingKind::Consultation
            && new_status == BookingStatus::Completed
            && diagnosis.is_none()
            && current.diagnosis.is_none()
        {
            return Err(BookingError::Validation(
                "A consultation cannot be completed without a diagnosis".to_string(),
            ));
        }

        let mut patch = Map::new();
        patch.insert("status".into(), json!(new_status));
        if let Some(diagnosis) = diagnosis {
            if kind == BookingKind::Appointment {
                return Err(BookingError::Validation(
                    "Appointments do not carry a diagnosis".to_string(),
                ));
            }
            patch.insert("diagnosis".into(), json!(diagnosis));
        }
        patch.insert("updated_by".into(), json!(actor_id));
        patch.insert("updated_at".into(), json!(Utc::now()));

        let updated = self
            .store
            .update_by_id(BOOKINGS, booking_id, Value::Object(patch))
            .await?;
        info!("{} {}: {} -> {}", kind, booking_id, current.status, new_status);
        Ok(from_document(updated)?)
    }

    /// Edits descriptive fields only; time, staff and status are untouched.
    pub async fn update_details(
        &self,
        kind: BookingKind,
        booking_id: Uuid,
        request: UpdateBookingDetailsRequest,
        actor_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let current = self.get(kind, booking_id).await?;
        if current.status == BookingStatus::Cancelled {
            return Err(BookingError::Validation(format!(
                "Cancelled {} {} cannot be edited",
                kind, booking_id
            )));
        }
        if kind == BookingKind::Appointment && (request.diagnosis.is_some() || request.treatment.is_some()) {
            return Err(BookingError::Validation(
                "Appointments do not carry a diagnosis or treatment".to_string(),
            ));
        }

        let mut patch = Map::new();
        if let Some(reason) = request.reason {
            let reason = non_blank(Some(reason));
            if kind == BookingKind::Appointment && reason.is_none() {
                return Err(BookingError::Validation("An appointment requires a reason".to_string()));
            }
            patch.insert("reason".into(), json!(reason));
        }
        if let Some(diagnosis) = request.diagnosis {
            patch.insert("diagnosis".into(), json!(non_blank(Some(diagnosis))));
        }
        if let Some(treatment) = request.treatment {
            patch.insert("treatment".into(), json!(non_blank(Some(treatment))));
        }
        if let Some(notes) = request.notes {
            patch.insert("notes".into(), json!(non_blank(Some(notes))));
        }

        if patch.is_empty() {
            return Ok(current);
        }
        patch.insert("updated_by".into(), json!(actor_id));
        patch.insert("updated_at".into(), json!(Utc::now()));

        let updated = self
            .store
            .update_by_id(BOOKINGS, booking_id, Value::Object(patch))
            .await?;
        Ok(from_document(updated)?)
    }

    /// A booking of the other kind is reported as not found.
    pub async fn get(&self, kind: BookingKind, booking_id: Uuid) -> Result<Booking, BookingError> {
        let document = self
            .store
            .get(BOOKINGS, booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        let booking: Booking = from_document(document)?;
        if booking.kind != kind {
            return Err(BookingError::NotFound(booking_id));
        }
        Ok(booking)
    }

    pub async fn search(&self, kind: BookingKind, query: BookingQuery) -> Result<Vec<Booking>, BookingError> {
        let mut filter = Filter::new()
            .eq("kind", kind)
            .order_by("start_time", SortOrder::Asc)
            .offset(query.offset.unwrap_or(0))
            .limit(query.limit.unwrap_or(DEFAULT_PAGE_SIZE));

        if let Some(staff_id) = query.staff_id {
            filter = filter.eq("staff_id", staff_id);
        }
        if let Some(patient_id) = query.patient_id {
            filter = filter.eq("patient_id", patient_id);
        }
        if let Some(status) = query.status {
            filter = filter.eq("status", status);
        }
        if let Some(from) = query.from {
            filter = filter.gte("start_time", from);
        }
        if let Some(to) = query.to {
            filter = filter.lt("start_time", to);
        }

        Ok(from_documents(self.store.find(BOOKINGS, &filter).await?)?)
    }

    /// Read-only availability probe. The answer may be stale by the time a
    /// booking is attempted; only `create` and `reschedule` are authoritative.
    pub async fn check_slot(&self, query: ConflictCheckQuery) -> Result<ConflictCheckResponse, BookingError> {
        let duration_minutes = query.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration_minutes <= 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(BookingError::Validation(format!(
                "Duration must be between 1 and {} minutes",
                MAX_DURATION_MINUTES
            )));
        }

        let conflicts = self
            .guard
            .find_conflicts(query.staff_id, query.start_time, duration_minutes, query.exclude_booking_id)
            .await?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicts.is_empty(),
            conflicting_booking_ids: conflicts.into_iter().map(|b| b.id).collect(),
            start_time: query.start_time,
            end_time: query.start_time + Duration::minutes(duration_minutes),
        })
    }

    /// Runs `work` while holding the scheduling lock of `staff_id`. The
    /// lease is released on every path; a failed release is logged and the
    /// lock then expires on its own.
    async fn with_staff_lock<T, F, Fut>(&self, staff_id: Uuid, work: F) -> Result<T, BookingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let key = format!("staff:{}", staff_id);
        let lease = self.store.acquire_lock(&key, self.lock_wait).await?;

        let outcome = work().await;

        if let Err(e) = lease.release().await {
            warn!("Failed to release scheduling lock {}: {}", key, e);
        }
        outcome
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use futures::future::join_all;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use shared_database::{LockLease, MemoryStore, StoreError, StoreResult};
    use shared_models::auth::Role;

    use crate::services::test_support::{seed_patient, seed_staff};

    struct Fixture {
        store: Arc<MemoryStore>,
        service: BookingService,
        patient: Uuid,
        doctor: Uuid,
        actor: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let patient = seed_patient(&store).await;
        let doctor = seed_staff(&store, Role::Doctor).await;
        let service = BookingService::new(store.clone(), SchedulingPolicy::default(), StdDuration::from_secs(2));
        Fixture {
            store,
            service,
            patient,
            doctor,
            actor: Uuid::new_v4(),
        }
    }

    /// A time on the day after tomorrow, so it is always in the future.
    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        let day = (Utc::now() + Duration::days(2)).date_naive();
        Utc.from_utc_datetime(&day.and_hms_opt(hour, minute, 0).unwrap())
    }

    fn request(patient: Uuid, staff: Uuid, start: DateTime<Utc>, minutes: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            patient_id: patient,
            staff_id: staff,
            start_time: start,
            duration_minutes: Some(minutes),
            reason: Some("Suivi tension".to_string()),
            notes: None,
        }
    }

    async fn book(fx: &Fixture, start: DateTime<Utc>, minutes: i64) -> Result<Booking, BookingError> {
        fx.service
            .create(BookingKind::Appointment, request(fx.patient, fx.doctor, start, minutes), fx.actor)
            .await
    }

    #[tokio::test]
    async fn create_persists_planned_booking() {
        let fx = fixture().await;

        let booking = book(&fx, at(9, 0), 30).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Planned);
        assert_eq!(booking.created_by, fx.actor);
        assert_eq!(booking.end_time(), at(9, 30));
        assert_eq!(fx.store.count(BOOKINGS).await, 1);
    }

    #[tokio::test]
    async fn overlapping_create_reports_existing_booking() {
        let fx = fixture().await;
        let first = book(&fx, at(9, 0), 30).await.unwrap();
        fx.service
            .transition(BookingKind::Appointment, first.id, BookingStatus::Confirmed, None, fx.actor)
            .await
            .unwrap();

        let result = book(&fx, at(9, 15), 30).await;

        assert_matches!(result, Err(BookingError::Conflict { conflicting_id }) if conflicting_id == first.id);
        assert_eq!(fx.store.count(BOOKINGS).await, 1);
    }

    #[tokio::test]
    async fn back_to_back_bookings_do_not_conflict() {
        let fx = fixture().await;
        book(&fx, at(9, 0), 30).await.unwrap();

        assert!(book(&fx, at(9, 30), 30).await.is_ok());
        assert!(book(&fx, at(8, 30), 30).await.is_ok());
    }

    #[tokio::test]
    async fn reschedule_excludes_itself_but_not_others() {
        let fx = fixture().await;
        let b = book(&fx, at(10, 0), 30).await.unwrap();
        let c = book(&fx, at(11, 0), 30).await.unwrap();

        let moved = fx
            .service
            .reschedule(
                BookingKind::Appointment,
                b.id,
                RescheduleBookingRequest {
                    start_time: at(10, 15),
                    staff_id: None,
                    duration_minutes: None,
                },
                fx.actor,
            )
            .await
            .unwrap();
        assert_eq!(moved.start_time, at(10, 15));
        assert_eq!(moved.updated_by, Some(fx.actor));

        let result = fx
            .service
            .reschedule(
                BookingKind::Appointment,
                b.id,
                RescheduleBookingRequest {
                    start_time: at(10, 45),
                    staff_id: None,
                    duration_minutes: None,
                },
                fx.actor,
            )
            .await;
        assert_matches!(result, Err(BookingError::Conflict { conflicting_id }) if conflicting_id == c.id);

        let stored = fx.service.get(BookingKind::Appointment, b.id).await.unwrap();
        assert_eq!(stored.start_time, at(10, 15));
    }

    #[tokio::test]
    async fn reschedule_without_changes_is_a_no_op() {
        let fx = fixture().await;
        let b = book(&fx, at(10, 0), 30).await.unwrap();

        let same = fx
            .service
            .reschedule(
                BookingKind::Appointment,
                b.id,
                RescheduleBookingRequest {
                    start_time: b.start_time,
                    staff_id: Some(fx.doctor),
                    duration_minutes: Some(30),
                },
                fx.actor,
            )
            .await
            .unwrap();

        assert_eq!(same.updated_by, None);
        assert_eq!(same.updated_at, b.updated_at);
    }

    #[tokio::test]
    async fn cancelled_slot_can_be_rebooked() {
        let fx = fixture().await;
        let b = book(&fx, at(14, 0), 30).await.unwrap();

        let cancelled = fx
            .service
            .cancel(BookingKind::Appointment, b.id, Some("Patient hospitalisé".to_string()), fx.actor)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(fx.actor));
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Patient hospitalisé"));

        assert!(book(&fx, at(14, 0), 30).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let fx = fixture().await;
        let b = book(&fx, at(14, 0), 30).await.unwrap();

        let first = fx.service.cancel(BookingKind::Appointment, b.id, None, fx.actor).await.unwrap();
        let second = fx
            .service
            .cancel(BookingKind::Appointment, b.id, Some("again".to_string()), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(second.status, BookingStatus::Cancelled);
        assert_eq!(second.cancelled_at, first.cancelled_at);
        assert_eq!(second.cancelled_by, Some(fx.actor));
        assert_eq!(second.cancellation_reason, None);
    }

    #[tokio::test]
    async fn completed_booking_cannot_be_cancelled() {
        let fx = fixture().await;
        let b = book(&fx, at(15, 0), 30).await.unwrap();
        for status in [BookingStatus::Confirmed, BookingStatus::Completed] {
            fx.service
                .transition(BookingKind::Appointment, b.id, status, None, fx.actor)
                .await
                .unwrap();
        }

        assert_matches!(
            fx.service.cancel(BookingKind::Appointment, b.id, None, fx.actor).await,
            Err(BookingError::InvalidStatusTransition { from: BookingStatus::Completed, .. })
        );
    }

    #[tokio::test]
    async fn concurrent_creates_for_same_slot_accept_exactly_one() {
        let fx = fixture().await;

        let attempts = (0..8).map(|_| book(&fx, at(9, 0), 30));
        let results = join_all(attempts).await;

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(BookingError::Conflict { .. })))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(rejected, 7);
        assert_eq!(fx.store.count(BOOKINGS).await, 1);
    }

    #[tokio::test]
    async fn reschedule_and_create_race_for_same_slot() {
        let fx = fixture().await;
        let b = book(&fx, at(14, 0), 30).await.unwrap();

        let (moved, created) = futures::join!(
            fx.service.reschedule(
                BookingKind::Appointment,
                b.id,
                RescheduleBookingRequest {
                    start_time: at(9, 0),
                    staff_id: None,
                    duration_minutes: None,
                },
                fx.actor,
            ),
            book(&fx, at(9, 0), 30),
        );

        assert_eq!(
            moved.is_ok() as usize + created.is_ok() as usize,
            1,
            "exactly one booking may take the slot"
        );
        if moved.is_ok() {
            assert_matches!(created, Err(BookingError::Conflict { conflicting_id }) if conflicting_id == b.id);
        } else {
            assert_matches!(moved, Err(BookingError::Conflict { .. }));
        }

        let response = fx
            .service
            .check_slot(ConflictCheckQuery {
                staff_id: fx.doctor,
                start_time: at(9, 0),
                duration_minutes: Some(30),
                exclude_booking_id: None,
            })
            .await
            .unwrap();
        assert_eq!(response.conflicting_booking_ids.len(), 1);
    }

    #[tokio::test]
    async fn conflicts_span_appointments_and_consultations() {
        let fx = fixture().await;
        book(&fx, at(9, 0), 60).await.unwrap();

        let result = fx
            .service
            .create(BookingKind::Consultation, request(fx.patient, fx.doctor, at(9, 30), 30), fx.actor)
            .await;

        assert_matches!(result, Err(BookingError::Conflict { .. }));
    }

    #[tokio::test]
    async fn other_kind_is_not_found() {
        let fx = fixture().await;
        let b = book(&fx, at(9, 0), 30).await.unwrap();

        assert_matches!(
            fx.service.get(BookingKind::Consultation, b.id).await,
            Err(BookingError::NotFound(id)) if id == b.id
        );
    }

    #[tokio::test]
    async fn inactive_patient_is_not_found() {
        let fx = fixture().await;
        fx.store
            .update_by_id(patient_cell::PATIENTS, fx.patient, json!({ "is_active": false }))
            .await
            .unwrap();

        assert_matches!(book(&fx, at(9, 0), 30).await, Err(BookingError::PatientNotFound(_)));
    }

    #[tokio::test]
    async fn appointment_requires_reason() {
        let fx = fixture().await;
        let mut req = request(fx.patient, fx.doctor, at(9, 0), 30);
        req.reason = Some("   ".to_string());

        assert_matches!(
            fx.service.create(BookingKind::Appointment, req, fx.actor).await,
            Err(BookingError::Validation(_))
        );
    }

    #[tokio::test]
    async fn consultation_completion_needs_diagnosis() {
        let fx = fixture().await;
        let kind = BookingKind::Consultation;
        let c = fx
            .service
            .create(kind, request(fx.patient, fx.doctor, at(11, 0), 30), fx.actor)
            .await
            .unwrap();
        for status in [BookingStatus::Confirmed, BookingStatus::InProgress] {
            fx.service.transition(kind, c.id, status, None, fx.actor).await.unwrap();
        }

        assert_matches!(
            fx.service.transition(kind, c.id, BookingStatus::Completed, None, fx.actor).await,
            Err(BookingError::Validation(_))
        );
        let done = fx
            .service
            .transition(kind, c.id, BookingStatus::Completed, Some("Angine".to_string()), fx.actor)
            .await
            .unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
        assert_eq!(done.diagnosis.as_deref(), Some("Angine"));
    }

    #[tokio::test]
    async fn update_details_leaves_schedule_alone() {
        let fx = fixture().await;
        let b = book(&fx, at(9, 0), 30).await.unwrap();

        let updated = fx
            .service
            .update_details(
                BookingKind::Appointment,
                b.id,
                UpdateBookingDetailsRequest {
                    notes: Some("Apporter les résultats".to_string()),
                    ..Default::default()
                },
                fx.actor,
            )
            .await
            .unwrap();

        assert_eq!(updated.notes.as_deref(), Some("Apporter les résultats"));
        assert_eq!(updated.start_time, b.start_time);
        assert_matches!(
            fx.service
                .update_details(
                    BookingKind::Appointment,
                    b.id,
                    UpdateBookingDetailsRequest {
                        diagnosis: Some("x".to_string()),
                        ..Default::default()
                    },
                    fx.actor,
                )
                .await,
            Err(BookingError::Validation(_))
        );
    }

    #[tokio::test]
    async fn check_slot_lists_every_overlap() {
        let fx = fixture().await;
        let a = book(&fx, at(9, 0), 30).await.unwrap();
        let b = book(&fx, at(9, 30), 30).await.unwrap();

        let response = fx
            .service
            .check_slot(ConflictCheckQuery {
                staff_id: fx.doctor,
                start_time: at(9, 15),
                duration_minutes: Some(30),
                exclude_booking_id: None,
            })
            .await
            .unwrap();

        assert!(response.has_conflict);
        assert_eq!(response.conflicting_booking_ids, vec![a.id, b.id]);
        assert_eq!(response.end_time, at(9, 45));
    }

    /// Fails every booking lookup as if the backend timed out.
    struct TimingOutStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl RecordStore for TimingOutStore {
        async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
            if collection == BOOKINGS {
                return Err(StoreError::Timeout("bookings query".to_string()));
            }
            self.inner.find(collection, filter).await
        }

        async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Value>> {
            self.inner.get(collection, id).await
        }

        async fn insert(&self, collection: &str, document: Value) -> StoreResult<Value> {
            self.inner.insert(collection, document).await
        }

        async fn update_by_id(&self, collection: &str, id: Uuid, patch: Value) -> StoreResult<Value> {
            self.inner.update_by_id(collection, id, patch).await
        }

        async fn delete_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Value> {
            self.inner.delete_by_id(collection, id).await
        }

        async fn acquire_lock(&self, key: &str, wait: StdDuration) -> StoreResult<Box<dyn LockLease>> {
            self.inner.acquire_lock(key, wait).await
        }
    }

    #[tokio::test]
    async fn store_timeout_is_transient_and_writes_nothing() {
        let inner = MemoryStore::new();
        let patient = seed_patient(&inner).await;
        let doctor = seed_staff(&inner, Role::Doctor).await;
        let store = Arc::new(TimingOutStore { inner });
        let service = BookingService::new(store.clone(), SchedulingPolicy::default(), StdDuration::from_secs(1));

        let result = service
            .create(BookingKind::Appointment, request(patient, doctor, at(9, 0), 30), Uuid::new_v4())
            .await;

        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.inner.count(BOOKINGS).await, 0);
    }

    #[tokio::test]
    async fn held_lock_surfaces_as_transient_error() {
        let fx = fixture().await;
        let service = BookingService::new(fx.store.clone(), SchedulingPolicy::default(), StdDuration::from_millis(50));
        let lease = fx
            .store
            .acquire_lock(&format!("staff:{}", fx.doctor), StdDuration::from_secs(1))
            .await
            .unwrap();

        let result = service
            .create(BookingKind::Appointment, request(fx.patient, fx.doctor, at(9, 0), 30), fx.actor)
            .await;

        assert_matches!(result, Err(BookingError::Store(StoreError::Timeout(_))));
        lease.release().await.unwrap();
        assert!(book(&fx, at(9, 0), 30).await.is_ok());
    }

    /// Random create/reschedule/cancel sequences never leave two active
    /// bookings of one staff member overlapping.
    #[tokio::test]
    async fn random_operations_keep_schedules_disjoint() {
        let fx = fixture().await;
        let second_doctor = seed_staff(&fx.store, Role::Doctor).await;
        let staff = [fx.doctor, second_doctor];
        let mut rng = StdRng::seed_from_u64(0x5eed_1234);

        let mut ids: Vec<Uuid> = Vec::new();
        for _ in 0..120 {
            let start = at(8, 0) + Duration::minutes(5 * rng.gen_range(0..96));
            let minutes = [15, 30, 45, 60, 90][rng.gen_range(0..5)];
            let staff_id = staff[rng.gen_range(0..2)];

            match rng.gen_range(0..4) {
                0 | 1 => {
                    if let Ok(b) = fx
                        .service
                        .create(BookingKind::Appointment, request(fx.patient, staff_id, start, minutes), fx.actor)
                        .await
                    {
                        ids.push(b.id);
                    }
                }
                2 if !ids.is_empty() => {
                    let id = ids[rng.gen_range(0..ids.len())];
                    let _ = fx
                        .service
                        .reschedule(
                            BookingKind::Appointment,
                            id,
                            RescheduleBookingRequest {
                                start_time: start,
                                staff_id: Some(staff_id),
                                duration_minutes: Some(minutes),
                            },
                            fx.actor,
                        )
                        .await;
                }
                3 if !ids.is_empty() => {
                    let id = ids[rng.gen_range(0..ids.len())];
                    fx.service.cancel(BookingKind::Appointment, id, None, fx.actor).await.unwrap();
                }
                _ => {}
            }
        }

        let all = fx
            .service
            .search(
                BookingKind::Appointment,
                BookingQuery {
                    limit: Some(1_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let active: Vec<&Booking> = all.iter().filter(|b| b.status.blocks_slot()).collect();
        for (i, a) in active.iter().enumerate() {
            for b in &active[i + 1..] {
                if a.staff_id == b.staff_id {
                    assert!(
                        a.end_time() <= b.start_time || b.end_time() <= a.start_time,
                        "{} and {} overlap",
                        a.id,
                        b.id
                    );
                }
            }
        }
    }
}

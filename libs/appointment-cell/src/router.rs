use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Extension, Router,
};

use shared_models::access::Capability;
use shared_utils::extractor::{auth_middleware, authorize};
use shared_utils::AppState;

use crate::handlers::*;
use crate::models::BookingKind;

pub fn appointment_routes(state: Arc<AppState>) -> Router {
    booking_routes(state, BookingKind::Appointment)
}

pub fn consultation_routes(state: Arc<AppState>) -> Router {
    booking_routes(state, BookingKind::Consultation)
}

fn booking_routes(state: Arc<AppState>, kind: BookingKind) -> Router {
    let manage = match kind {
        BookingKind::Appointment => Capability::ManageAppointments,
        BookingKind::Consultation => Capability::ManageConsultations,
    };

    let read = Router::new()
        .route("/", get(search_bookings))
        .route("/conflicts/check", get(check_conflicts))
        .route("/{id}", get(get_booking))
        .route_layer(middleware::from_fn_with_state(Capability::ViewBookings, authorize));

    let write = Router::new()
        .route("/", post(create_booking))
        .route("/{id}", put(update_booking))
        .route("/{id}/reschedule", patch(reschedule_booking))
        .route("/{id}/cancel", post(cancel_booking))
        .route("/{id}/status", patch(update_booking_status))
        .route_layer(middleware::from_fn_with_state(manage, authorize));

    read.merge(write)
        .layer(Extension(kind))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

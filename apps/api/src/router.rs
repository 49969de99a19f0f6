use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, consultation_routes};
use auth_cell::{auth_routes, login_routes};
use medication_cell::medication_routes;
use patient_cell::patient_routes;
use shared_utils::AppState;
use staff_cell::staff_routes;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/auth", auth_routes(state.clone()))
        .nest(
            "/personnels",
            login_routes(state.clone()).merge(staff_routes(state.clone())),
        )
        .nest("/patients", patient_routes(state.clone()))
        .nest("/rendezvous", appointment_routes(state.clone()))
        .nest("/consultations", consultation_routes(state.clone()))
        .nest("/medicaments", medication_routes(state));

    Router::new()
        .route("/", get(|| async { "Hopital API is running!" }))
        .nest("/api", api)
}

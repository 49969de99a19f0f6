use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_models::access::Capability;
use shared_utils::extractor::{auth_middleware, authorize};
use shared_utils::AppState;

use crate::handlers::*;

pub fn patient_routes(state: Arc<AppState>) -> Router {
    let read = Router::new()
        .route("/", get(search_patients))
        .route("/{id}", get(get_patient))
        .route_layer(middleware::from_fn_with_state(Capability::ViewPatients, authorize));

    let write = Router::new()
        .route("/", post(create_patient))
        .route("/{id}", put(update_patient).delete(deactivate_patient))
        .route_layer(middleware::from_fn_with_state(Capability::ManagePatients, authorize));

    read.merge(write)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

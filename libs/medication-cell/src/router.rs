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

pub fn medication_routes(state: Arc<AppState>) -> Router {
    let read = Router::new()
        .route("/", get(list_medications))
        .route("/{id}", get(get_medication))
        .route_layer(middleware::from_fn_with_state(Capability::ViewInventory, authorize));

    let write = Router::new()
        .route("/", post(create_medication))
        .route("/{id}", put(update_medication).delete(delete_medication))
        .route("/{id}/stock", post(adjust_stock))
        .route_layer(middleware::from_fn_with_state(Capability::ManageInventory, authorize));

    read.merge(write)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

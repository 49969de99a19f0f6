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

pub fn staff_routes(state: Arc<AppState>) -> Router {
    let read = Router::new()
        .route("/", get(list_staff))
        .route("/{id}", get(get_staff))
        .route_layer(middleware::from_fn_with_state(Capability::ViewStaff, authorize));

    let admin = Router::new()
        .route("/", post(create_staff))
        .route("/{id}", put(update_staff).delete(deactivate_staff))
        .route_layer(middleware::from_fn_with_state(Capability::ManageStaff, authorize));

    read.merge(admin)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

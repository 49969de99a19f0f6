use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{CreateStaffRequest, StaffQuery, UpdateStaffRequest};
use crate::services::StaffService;

fn service(state: &AppState) -> StaffService {
    StaffService::new(state.store.clone(), state.lock_wait())
}

#[axum::debug_handler]
pub async fn create_staff(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let staff = service(&state).register(request).await?;
    info!("Staff member {} created by {}", staff.id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "staff": staff,
            "message": "Staff member created successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_staff(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaffQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query.limit;
    let offset = query.offset;
    let staff = service(&state).list(query).await?;

    Ok(Json(json!({
        "staff": staff,
        "total": staff.len(),
        "limit": limit,
        "offset": offset
    })))
}

#[axum::debug_handler]
pub async fn get_staff(
    State(state): State<Arc<AppState>>,
    Path(staff_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let staff = service(&state).get_profile(staff_id).await?;
    Ok(Json(json!(staff)))
}

#[axum::debug_handler]
pub async fn update_staff(
    State(state): State<Arc<AppState>>,
    Path(staff_id): Path<Uuid>,
    Json(request): Json<UpdateStaffRequest>,
) -> Result<Json<Value>, AppError> {
    let staff = service(&state).update(staff_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "staff": staff,
        "message": "Staff member updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn deactivate_staff(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(staff_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if staff_id == user.id {
        return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
    }

    let staff = service(&state).deactivate(staff_id).await?;
    info!("Staff member {} deactivated by {}", staff_id, user.id);

    Ok(Json(json!({
        "success": true,
        "staff": staff,
        "message": "Staff member deactivated"
    })))
}

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

use crate::models::{CreateMedicationRequest, MedicationQuery, StockAdjustmentRequest, UpdateMedicationRequest};
use crate::services::MedicationService;

fn service(state: &AppState) -> MedicationService {
    MedicationService::new(state.store.clone(), state.lock_wait())
}

#[axum::debug_handler]
pub async fn create_medication(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateMedicationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let medication = service(&state).create(request).await?;
    info!("Medication {} added by {}", medication.id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "medication": medication,
            "message": "Medication created successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_medications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MedicationQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query.limit;
    let offset = query.offset;
    let medications = service(&state).list(query).await?;

    Ok(Json(json!({
        "medications": medications,
        "total": medications.len(),
        "limit": limit,
        "offset": offset
    })))
}

#[axum::debug_handler]
pub async fn get_medication(
    State(state): State<Arc<AppState>>,
    Path(medication_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let medication = service(&state).get(medication_id).await?;

    Ok(Json(json!(medication)))
}

#[axum::debug_handler]
pub async fn update_medication(
    State(state): State<Arc<AppState>>,
    Path(medication_id): Path<Uuid>,
    Json(request): Json<UpdateMedicationRequest>,
) -> Result<Json<Value>, AppError> {
    let medication = service(&state).update(medication_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "medication": medication,
        "message": "Medication updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(medication_id): Path<Uuid>,
    Json(request): Json<StockAdjustmentRequest>,
) -> Result<Json<Value>, AppError> {
    let medication = service(&state).adjust_stock(medication_id, request.delta).await?;
    info!("Stock of {} adjusted by {} ({})", medication_id, request.delta, user.id);

    Ok(Json(json!({
        "success": true,
        "medication": medication,
        "message": "Stock updated"
    })))
}

#[axum::debug_handler]
pub async fn delete_medication(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(medication_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    service(&state).delete(medication_id).await?;
    info!("Medication {} deleted by {}", medication_id, user.id);

    Ok(Json(json!({
        "success": true,
        "message": "Medication deleted"
    })))
}

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

use crate::models::{CreatePatientRequest, PatientSearchQuery, UpdatePatientRequest};
use crate::services::PatientService;

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = PatientService::new(state.store.clone());

    let patient = service.create_patient(request).await?;
    info!("Patient {} created by {}", patient.id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "patient": patient,
            "message": "Patient created successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(state.store.clone());

    let patient = service.get_patient(patient_id).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(state.store.clone());

    let patient = service.update_patient(patient_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "patient": patient,
        "message": "Patient updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn deactivate_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(state.store.clone());

    let patient = service.deactivate_patient(patient_id).await?;
    info!("Patient {} deactivated by {}", patient_id, user.id);

    Ok(Json(json!({
        "success": true,
        "patient": patient,
        "message": "Patient deactivated"
    })))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(state.store.clone());

    let limit = query.limit;
    let offset = query.offset;
    let patients = service.search_patients(query).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len(),
        "limit": limit,
        "offset": offset
    })))
}

use std::sync::Arc;

use axum::extract::{Extension, Json, State};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::AppState;
use staff_cell::StaffService;

use crate::models::{LoginRequest, LoginResponse};
use crate::services::AuthService;

#[axum::debug_handler]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let staff = StaffService::new(state.store.clone(), state.lock_wait());
    let service = AuthService::new(staff, state.tokens.clone());

    Ok(Json(service.login(request).await?))
}

#[axum::debug_handler]
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let user = state
        .tokens
        .verify(auth.token())
        .map_err(|e| AppError::Auth(e.to_string()))?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id,
        email: user.email,
        role: user.role,
    }))
}

#[axum::debug_handler]
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    debug!("Verifying token");

    Ok(Json(json!({ "valid": state.tokens.verify(auth.token()).is_ok() })))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let staff = StaffService::new(state.store.clone(), state.lock_wait());
    let profile = staff.get_profile(user.id).await?;

    Ok(Json(json!({
        "user_id": user.id,
        "role": user.role,
        "profile": profile
    })))
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::Role;
use shared_models::error::AppError;
use shared_utils::jwt::TokenError;
use staff_cell::StaffError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: SessionUser,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Staff(#[from] StaffError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::AccountDisabled => AppError::Auth(err.to_string()),
            AuthError::Token(TokenError::MissingSecret) => {
                AppError::Internal("Token signing is not configured".to_string())
            }
            AuthError::Token(err) => AppError::Auth(err.to_string()),
            AuthError::Staff(err) => err.into(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::auth::Role;
use shared_models::error::AppError;

pub const STAFF: &str = "staff";

/// Stored staff record. Never returned as-is; see [`StaffProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StaffMember {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StaffMember> for StaffProfile {
    fn from(member: StaffMember) -> Self {
        Self {
            id: member.id,
            first_name: member.first_name,
            last_name: member.last_name,
            role: member.role,
            department: member.department,
            phone: member.phone,
            email: member.email,
            is_active: member.is_active,
            created_at: member.created_at,
            updated_at: member.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStaffRequest {
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStaffRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaffQuery {
    pub role: Option<Role>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum StaffError {
    #[error("Staff member {0} not found")]
    NotFound(Uuid),

    #[error("A staff member with email {0} already exists")]
    EmailTaken(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Password too weak: {}", .0.join(", "))]
    WeakPassword(Vec<String>),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AppError> for StaffError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::ValidationError(msg) | AppError::BadRequest(msg) => StaffError::Validation(msg),
            other => StaffError::Validation(other.to_string()),
        }
    }
}

impl From<argon2::password_hash::Error> for StaffError {
    fn from(err: argon2::password_hash::Error) -> Self {
        StaffError::Hashing(err.to_string())
    }
}

impl From<StaffError> for AppError {
    fn from(err: StaffError) -> Self {
        match err {
            StaffError::NotFound(id) => AppError::NotFound(format!("Staff member {} not found", id)),
            StaffError::EmailTaken(email) => {
                AppError::Conflict(format!("A staff member with email {} already exists", email))
            }
            StaffError::Validation(msg) => AppError::ValidationError(msg),
            err @ StaffError::WeakPassword(_) => AppError::ValidationError(err.to_string()),
            StaffError::Hashing(msg) => AppError::Internal(msg),
            StaffError::Store(err) => err.into(),
        }
    }
}

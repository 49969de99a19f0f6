use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record {id} not found in {collection}")]
    NotFound { collection: String, id: Uuid },

    #[error("Record {id} already exists in {collection}")]
    Duplicate { collection: String, id: Uuid },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Transient failures may be retried by the caller with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidDocument(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                AppError::NotFound(format!("{} {} not found", collection, id))
            }
            StoreError::Duplicate { collection, id } => {
                AppError::Conflict(format!("{} {} already exists", collection, id))
            }
            err if err.is_transient() => AppError::Unavailable(err.to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

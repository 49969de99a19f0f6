use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

pub const MEDICATIONS: &str = "medications";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub dosage: Option<String>,
    /// Galenic form: tablet, syrup, injection...
    pub form: Option<String>,
    pub quantity_available: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMedicationRequest {
    #[serde(alias = "nom")]
    pub name: String,
    pub description: Option<String>,
    pub dosage: Option<String>,
    #[serde(alias = "forme")]
    pub form: Option<String>,
    #[serde(default, alias = "quantite_disponible")]
    pub quantity_available: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMedicationRequest {
    #[serde(alias = "nom")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub dosage: Option<String>,
    #[serde(alias = "forme")]
    pub form: Option<String>,
    #[serde(alias = "quantite_disponible")]
    pub quantity_available: Option<i64>,
}

/// Signed stock movement: positive for a delivery, negative for dispensing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustmentRequest {
    pub delta: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicationQuery {
    pub name: Option<String>,
    /// Only medications with at most this many units left.
    pub low_stock_threshold: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum MedicationError {
    #[error("Medication {0} not found")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient stock for {id}: {available} available, {requested} requested")]
    InsufficientStock {
        id: Uuid,
        available: i64,
        requested: i64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AppError> for MedicationError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::ValidationError(msg) | AppError::BadRequest(msg) => MedicationError::Validation(msg),
            other => MedicationError::Validation(other.to_string()),
        }
    }
}

impl From<MedicationError> for AppError {
    fn from(err: MedicationError) -> Self {
        match err {
            MedicationError::NotFound(id) => AppError::NotFound(format!("Medication {} not found", id)),
            MedicationError::Validation(msg) => AppError::ValidationError(msg),
            err @ MedicationError::InsufficientStock { .. } => AppError::ValidationError(err.to_string()),
            MedicationError::Store(err) => err.into(),
        }
    }
}

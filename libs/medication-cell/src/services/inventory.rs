use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_database::{from_document, from_documents, to_document, Filter, RecordStore, SortOrder, StoreError};
use shared_utils::validation::require_text;

use crate::models::{
    CreateMedicationRequest, Medication, MedicationError, MedicationQuery, UpdateMedicationRequest, MEDICATIONS,
};

const DEFAULT_PAGE_SIZE: usize = 100;

pub struct MedicationService {
    store: Arc<dyn RecordStore>,
    lock_wait: Duration,
}

impl MedicationService {
    pub fn new(store: Arc<dyn RecordStore>, lock_wait: Duration) -> Self {
        Self { store, lock_wait }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateMedicationRequest) -> Result<Medication, MedicationError> {
        ensure_quantity(request.quantity_available)?;

        let now = Utc::now();
        let medication = Medication {
            id: Uuid::new_v4(),
            name: require_text("name", &request.name)?,
            description: non_blank(request.description),
            dosage: non_blank(request.dosage),
            form: non_blank(request.form),
            quantity_available: request.quantity_available,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(MEDICATIONS, to_document(&medication)?).await?;
        info!("Medication added: {} ({})", medication.name, medication.id);
        Ok(from_document(stored)?)
    }

    pub async fn get(&self, medication_id: Uuid) -> Result<Medication, MedicationError> {
        let document = self
            .store
            .get(MEDICATIONS, medication_id)
            .await?
            .ok_or(MedicationError::NotFound(medication_id))?;
        Ok(from_document(document)?)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        medication_id: Uuid,
        request: UpdateMedicationRequest,
    ) -> Result<Medication, MedicationError> {
        let current = self.get(medication_id).await?;

        let mut patch = Map::new();
        if let Some(name) = request.name {
            patch.insert("name".into(), json!(require_text("name", &name)?));
        }
        if let Some(description) = request.description {
            patch.insert("description".into(), json!(non_blank(Some(description))));
        }
        if let Some(dosage) = request.dosage {
            patch.insert("dosage".into(), json!(non_blank(Some(dosage))));
        }
        if let Some(form) = request.form {
            patch.insert("form".into(), json!(non_blank(Some(form))));
        }
        if let Some(quantity) = request.quantity_available {
            ensure_quantity(quantity)?;
            patch.insert("quantity_available".into(), json!(quantity));
        }

        if patch.is_empty() {
            return Ok(current);
        }
        patch.insert("updated_at".into(), json!(Utc::now()));

        let write = move || async move {
            let updated = self
                .store
                .update_by_id(MEDICATIONS, medication_id, Value::Object(patch))
                .await
                .map_err(|e| not_found_as(e, medication_id))?;
            Ok::<_, MedicationError>(from_document(updated)?)
        };

        // A stock count set here must not interleave with a running adjustment.
        if request.quantity_available.is_some() {
            self.with_stock_lock(medication_id, write).await
        } else {
            write().await
        }
    }

    /// Applies a signed stock movement. Concurrent adjustments of the same
    /// medication are serialized so the count never drops below zero.
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, medication_id: Uuid, delta: i64) -> Result<Medication, MedicationError> {
        if delta == 0 {
            return Err(MedicationError::Validation("Stock delta must not be zero".to_string()));
        }

        self.with_stock_lock(medication_id, || self.apply_delta(medication_id, delta))
            .await
    }

    async fn apply_delta(&self, medication_id: Uuid, delta: i64) -> Result<Medication, MedicationError> {
        let current = self.get(medication_id).await?;
        let remaining = current.quantity_available.checked_add(delta).ok_or_else(|| {
            MedicationError::Validation(format!(
                "Stock delta {} is out of range for a stock of {}",
                delta, current.quantity_available
            ))
        })?;
        if remaining < 0 {
            return Err(MedicationError::InsufficientStock {
                id: medication_id,
                available: current.quantity_available,
                requested: delta.checked_neg().ok_or_else(|| {
                    MedicationError::Validation(format!("Stock delta {} is out of range", delta))
                })?,
            });
        }

        let updated = self
            .store
            .update_by_id(
                MEDICATIONS,
                medication_id,
                json!({ "quantity_available": remaining, "updated_at": Utc::now() }),
            )
            .await?;
        info!("Stock of {} moved by {} to {}", medication_id, delta, remaining);
        Ok(from_document(updated)?)
    }

    pub async fn delete(&self, medication_id: Uuid) -> Result<Medication, MedicationError> {
        let deleted = self
            .store
            .delete_by_id(MEDICATIONS, medication_id)
            .await
            .map_err(|e| not_found_as(e, medication_id))?;
        info!("Medication deleted: {}", medication_id);
        Ok(from_document(deleted)?)
    }

    pub async fn list(&self, query: MedicationQuery) -> Result<Vec<Medication>, MedicationError> {
        let mut filter = Filter::new()
            .order_by("name", SortOrder::Asc)
            .offset(query.offset.unwrap_or(0))
            .limit(query.limit.unwrap_or(DEFAULT_PAGE_SIZE));

        if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            filter = filter.contains("name", name);
        }
        if let Some(threshold) = query.low_stock_threshold {
            filter = filter.lte("quantity_available", threshold);
        }

        Ok(from_documents(self.store.find(MEDICATIONS, &filter).await?)?)
    }

    async fn with_stock_lock<T, F, Fut>(&self, medication_id: Uuid, work: F) -> Result<T, MedicationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MedicationError>>,
    {
        let key = format!("medication:{}", medication_id);
        let lease = self.store.acquire_lock(&key, self.lock_wait).await?;

        let outcome = work().await;

        if let Err(e) = lease.release().await {
            warn!("Failed to release stock lock {}: {}", key, e);
        }
        outcome
    }
}

fn ensure_quantity(quantity: i64) -> Result<(), MedicationError> {
    if quantity < 0 {
        return Err(MedicationError::Validation(format!(
            "quantity_available cannot be negative (got {})",
            quantity
        )));
    }
    Ok(())
}

fn not_found_as(err: StoreError, medication_id: Uuid) -> MedicationError {
    match err {
        StoreError::NotFound { .. } => MedicationError::NotFound(medication_id),
        other => MedicationError::Store(other),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

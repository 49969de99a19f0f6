use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_database::{from_document, from_documents, to_document, Filter, RecordStore, SortOrder};
use shared_utils::validation::{require_past_date, require_phone, require_text};

use crate::models::{
    CreatePatientRequest, Patient, PatientError, PatientSearchQuery, UpdatePatientRequest, PATIENTS,
};

const DEFAULT_PAGE_SIZE: usize = 50;

pub struct PatientService {
    store: Arc<dyn RecordStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, request))]
    pub async fn create_patient(&self, request: CreatePatientRequest) -> Result<Patient, PatientError> {
        let today = Utc::now().date_naive();
        require_past_date("date_of_birth", request.date_of_birth, today)?;

        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: require_text("first_name", &request.first_name)?,
            last_name: require_text("last_name", &request.last_name)?,
            date_of_birth: request.date_of_birth,
            sex: request.sex,
            address: non_blank(request.address),
            phone: non_blank(request.phone).map(|p| require_phone(&p)).transpose()?,
            medical_history: non_blank(request.medical_history),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(PATIENTS, to_document(&patient)?).await?;
        info!("Patient registered: {}", patient.id);
        Ok(from_document(stored)?)
    }

    pub async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        let document = self
            .store
            .get(PATIENTS, patient_id)
            .await?
            .ok_or(PatientError::NotFound(patient_id))?;
        Ok(from_document(document)?)
    }

    /// Like [`get_patient`](Self::get_patient) but treats deactivated records
    /// as absent. Used when a new booking references the patient.
    pub async fn get_active_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        let patient = self.get_patient(patient_id).await?;
        if !patient.is_active {
            debug!("Patient {} is inactive", patient_id);
            return Err(PatientError::NotFound(patient_id));
        }
        Ok(patient)
    }

    #[instrument(skip(self, request))]
    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        let current = self.get_patient(patient_id).await?;

        let mut patch = serde_json::Map::new();
        if let Some(first_name) = request.first_name {
            patch.insert("first_name".into(), json!(require_text("first_name", &first_name)?));
        }
        if let Some(last_name) = request.last_name {
            patch.insert("last_name".into(), json!(require_text("last_name", &last_name)?));
        }
        if let Some(date_of_birth) = request.date_of_birth {
            require_past_date("date_of_birth", date_of_birth, Utc::now().date_naive())?;
            patch.insert("date_of_birth".into(), json!(date_of_birth));
        }
        if let Some(sex) = request.sex {
            patch.insert("sex".into(), json!(sex));
        }
        if let Some(address) = request.address {
            patch.insert("address".into(), json!(non_blank(Some(address))));
        }
        if let Some(phone) = request.phone {
            let phone = non_blank(Some(phone)).map(|p| require_phone(&p)).transpose()?;
            patch.insert("phone".into(), json!(phone));
        }
        if let Some(history) = request.medical_history {
            patch.insert("medical_history".into(), json!(non_blank(Some(history))));
        }
        if let Some(is_active) = request.is_active {
            patch.insert("is_active".into(), json!(is_active));
        }

        if patch.is_empty() {
            return Ok(current);
        }
        patch.insert("updated_at".into(), json!(Utc::now()));

        let updated = self
            .store
            .update_by_id(PATIENTS, patient_id, serde_json::Value::Object(patch))
            .await?;
        debug!("Patient updated: {}", patient_id);
        Ok(from_document(updated)?)
    }

    /// Soft delete. The record stays so past bookings keep their reference.
    pub async fn deactivate_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        self.get_patient(patient_id).await?;

        let updated = self
            .store
            .update_by_id(
                PATIENTS,
                patient_id,
                json!({ "is_active": false, "updated_at": Utc::now() }),
            )
            .await?;
        info!("Patient deactivated: {}", patient_id);
        Ok(from_document(updated)?)
    }

    pub async fn search_patients(&self, query: PatientSearchQuery) -> Result<Vec<Patient>, PatientError> {
        let mut filter = Filter::new().order_by("last_name", SortOrder::Asc);
        if !query.include_inactive.unwrap_or(false) {
            filter = filter.eq("is_active", true);
        }

        let patients: Vec<Patient> = from_documents(self.store.find(PATIENTS, &filter).await?)?;

        // Name matches either first or last name, so it is applied here
        // rather than as a single-field store filter.
        let matched = patients
            .into_iter()
            .filter(|p| query.name.as_deref().map_or(true, |name| p.matches_name(name.trim())))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .collect();

        Ok(matched)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

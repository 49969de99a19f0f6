use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{from_document, from_documents, to_document, Filter, RecordStore, SortOrder};
use shared_models::auth::Role;
use shared_utils::password::{hash_password, password_issues};
use shared_utils::validation::{normalize_email, require_email, require_phone, require_text};

use crate::models::{
    CreateStaffRequest, StaffError, StaffMember, StaffProfile, StaffQuery, UpdateStaffRequest, STAFF,
};

const DEFAULT_PAGE_SIZE: usize = 50;

pub struct StaffService {
    store: Arc<dyn RecordStore>,
    lock_wait: Duration,
}

impl StaffService {
    pub fn new(store: Arc<dyn RecordStore>, lock_wait: Duration) -> Self {
        Self { store, lock_wait }
    }

    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn register(&self, request: CreateStaffRequest) -> Result<StaffProfile, StaffError> {
        let issues = password_issues(&request.password);
        if !issues.is_empty() {
            return Err(StaffError::WeakPassword(issues));
        }

        let now = Utc::now();
        let member = StaffMember {
            id: Uuid::new_v4(),
            first_name: require_text("first_name", &request.first_name)?,
            last_name: require_text("last_name", &request.last_name)?,
            role: request.role,
            department: non_blank(request.department),
            phone: non_blank(request.phone).map(|p| require_phone(&p)).transpose()?,
            email: require_email(&request.email)?,
            password_hash: hash_password(&request.password)?,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let lease = self
            .store
            .acquire_lock(&email_lock_key(&member.email), self.lock_wait)
            .await?;
        let outcome = self.insert_if_email_free(&member).await;
        if let Err(e) = lease.release().await {
            warn!("Failed to release email lock for {}: {}", member.email, e);
        }

        let stored = outcome?;
        info!("Staff member registered: {} ({})", stored.id, stored.role);
        Ok(stored.into())
    }

    async fn insert_if_email_free(&self, member: &StaffMember) -> Result<StaffMember, StaffError> {
        if self.find_by_email(&member.email).await?.is_some() {
            return Err(StaffError::EmailTaken(member.email.clone()));
        }
        let stored = self.store.insert(STAFF, to_document(member)?).await?;
        Ok(from_document(stored)?)
    }

    pub async fn get(&self, staff_id: Uuid) -> Result<StaffMember, StaffError> {
        let document = self
            .store
            .get(STAFF, staff_id)
            .await?
            .ok_or(StaffError::NotFound(staff_id))?;
        Ok(from_document(document)?)
    }

    pub async fn get_profile(&self, staff_id: Uuid) -> Result<StaffProfile, StaffError> {
        self.get(staff_id).await.map(StaffProfile::from)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<StaffMember>, StaffError> {
        let documents = self
            .store
            .find(STAFF, &Filter::new().eq("email", normalize_email(email)).limit(1))
            .await?;
        Ok(from_documents(documents)?.into_iter().next())
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, staff_id: Uuid, request: UpdateStaffRequest) -> Result<StaffProfile, StaffError> {
        let current = self.get(staff_id).await?;

        let mut patch = Map::new();
        if let Some(first_name) = request.first_name {
            patch.insert("first_name".into(), json!(require_text("first_name", &first_name)?));
        }
        if let Some(last_name) = request.last_name {
            patch.insert("last_name".into(), json!(require_text("last_name", &last_name)?));
        }
        if let Some(role) = request.role {
            patch.insert("role".into(), json!(role));
        }
        if let Some(department) = request.department {
            patch.insert("department".into(), json!(non_blank(Some(department))));
        }
        if let Some(phone) = request.phone {
            let phone = non_blank(Some(phone)).map(|p| require_phone(&p)).transpose()?;
            patch.insert("phone".into(), json!(phone));
        }
        if let Some(password) = request.password {
            let issues = password_issues(&password);
            if !issues.is_empty() {
                return Err(StaffError::WeakPassword(issues));
            }
            patch.insert("password_hash".into(), json!(hash_password(&password)?));
        }
        if let Some(is_active) = request.is_active {
            patch.insert("is_active".into(), json!(is_active));
        }

        let new_email = request
            .email
            .map(|email| require_email(&email))
            .transpose()?
            .filter(|email| *email != current.email);

        if patch.is_empty() && new_email.is_none() {
            return Ok(current.into());
        }
        patch.insert("updated_at".into(), json!(Utc::now()));

        let updated = match new_email {
            Some(email) => {
                let lease = self
                    .store
                    .acquire_lock(&email_lock_key(&email), self.lock_wait)
                    .await?;
                let outcome = self.apply_email_change(staff_id, email.clone(), patch).await;
                if let Err(e) = lease.release().await {
                    warn!("Failed to release email lock for {}: {}", email, e);
                }
                outcome?
            }
            None => self.apply(staff_id, patch).await?,
        };

        debug!("Staff member updated: {}", staff_id);
        Ok(updated.into())
    }

    async fn apply_email_change(
        &self,
        staff_id: Uuid,
        email: String,
        mut patch: Map<String, Value>,
    ) -> Result<StaffMember, StaffError> {
        if self.find_by_email(&email).await?.is_some() {
            return Err(StaffError::EmailTaken(email));
        }
        patch.insert("email".into(), json!(email));
        self.apply(staff_id, patch).await
    }

    async fn apply(&self, staff_id: Uuid, patch: Map<String, Value>) -> Result<StaffMember, StaffError> {
        let updated = self
            .store
            .update_by_id(STAFF, staff_id, Value::Object(patch))
            .await?;
        Ok(from_document(updated)?)
    }

    /// Soft delete. Existing bookings keep their staff reference.
    pub async fn deactivate(&self, staff_id: Uuid) -> Result<StaffProfile, StaffError> {
        self.get(staff_id).await?;

        let mut patch = Map::new();
        patch.insert("is_active".into(), json!(false));
        patch.insert("updated_at".into(), json!(Utc::now()));

        let updated = self.apply(staff_id, patch).await?;
        info!("Staff member deactivated: {}", staff_id);
        Ok(updated.into())
    }

    pub async fn list(&self, query: StaffQuery) -> Result<Vec<StaffProfile>, StaffError> {
        let mut filter = Filter::new()
            .order_by("last_name", SortOrder::Asc)
            .offset(query.offset.unwrap_or(0))
            .limit(query.limit.unwrap_or(DEFAULT_PAGE_SIZE));

        if let Some(role) = query.role {
            filter = filter.eq("role", role);
        }
        if let Some(department) = query.department {
            filter = filter.eq("department", department);
        }
        if let Some(is_active) = query.is_active {
            filter = filter.eq("is_active", is_active);
        }

        let members: Vec<StaffMember> = from_documents(self.store.find(STAFF, &filter).await?)?;
        Ok(members.into_iter().map(StaffProfile::from).collect())
    }

    /// Creates the first administrator when no active admin exists yet.
    /// Returns `None` when an admin is already present.
    pub async fn ensure_admin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<StaffProfile>, StaffError> {
        let admins = self
            .store
            .find(
                STAFF,
                &Filter::new().eq("role", Role::Admin).eq("is_active", true).limit(1),
            )
            .await?;
        if !admins.is_empty() {
            debug!("Administrator already present, skipping bootstrap");
            return Ok(None);
        }

        let profile = self
            .register(CreateStaffRequest {
                first_name: "Admin".to_string(),
                last_name: "Hopital".to_string(),
                role: Role::Admin,
                department: None,
                phone: None,
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        info!("Bootstrap administrator created: {}", profile.email);
        Ok(Some(profile))
    }
}

fn email_lock_key(email: &str) -> String {
    format!("staff-email:{}", email)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

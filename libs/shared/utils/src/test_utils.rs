use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use shared_config::{AppConfig, StoreBackend};
use shared_database::RecordStore;
use shared_models::auth::{Role, User};

use crate::jwt::TokenService;
use crate::state::AppState;

pub struct TestConfig {
    pub jwt_secret: String,
    pub lock_wait_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            lock_wait_ms: 2_000,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            store_backend: StoreBackend::Memory,
            lock_wait_ms: self.lock_wait_ms,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState::in_memory(self.to_app_config()))
    }

    pub fn state_with_store(&self, store: Arc<dyn RecordStore>) -> Arc<AppState> {
        Arc::new(AppState::new(self.to_app_config(), store))
    }
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl TestUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, Role::Admin)
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, Role::Doctor)
    }

    pub fn nurse(email: &str) -> Self {
        Self::new(email, Role::Nurse)
    }

    pub fn secretary(email: &str) -> Self {
        Self::new(email, Role::Secretary)
    }

    pub fn pharmacist(email: &str) -> Self {
        Self::new(email, Role::Pharmacist)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: Some(self.email.clone()),
            role: self.role,
            issued_at: None,
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        TokenService::new(secret, Duration::hours(24))
            .issue_with_ttl(
                user.id,
                user.role,
                Some(&user.email),
                Duration::hours(exp_hours.unwrap_or(24)),
            )
            .expect("test secret is not empty")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    pub fn bearer(user: &TestUser, config: &TestConfig) -> String {
        format!(
            "Bearer {}",
            Self::create_test_token(user, &config.jwt_secret, None)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default().to_app_config();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.is_configured());
    }

    #[test]
    fn test_token_verifies_against_test_secret() {
        let config = TestConfig::default();
        let user = TestUser::doctor("doc@hopital.test");
        let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

        let verified = TokenService::from_config(&config.to_app_config())
            .verify(&token)
            .unwrap();
        assert_eq!(verified.id, user.id);
        assert_eq!(verified.role, Role::Doctor);
        assert_eq!(token.split('.').count(), 3);
    }
}

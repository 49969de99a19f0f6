use std::sync::Arc;
use std::time::Duration;

use shared_config::AppConfig;
use shared_database::{MemoryStore, RecordStore};

use crate::jwt::TokenService;

/// Everything a handler needs, shared by all routers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn RecordStore>) -> Self {
        let tokens = TokenService::from_config(&config);
        Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
        }
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Upper bound on how long a write waits for a scheduling lock.
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.config.lock_wait_ms)
    }
}

pub mod router;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use shared_config::{AppConfig, StoreBackend};
use shared_database::{MemoryStore, RecordStore, SupabaseStore};
use shared_utils::AppState;
use staff_cell::StaffService;

pub use router::create_router;

/// Builds the shared state for the configured backend and creates the
/// bootstrap administrator when one is configured.
pub async fn build_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory record store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Supabase => {
            info!("Using Supabase record store at {}", config.supabase_url);
            Arc::new(SupabaseStore::new(&config).context("failed to configure Supabase store")?)
        }
    };

    let state = Arc::new(AppState::new(config, store));

    if let Some((email, password)) = state.config.bootstrap_admin() {
        StaffService::new(state.store.clone(), state.lock_wait())
            .ensure_admin(email, password)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bootstrap administrator: {}", e))?;
    }

    Ok(state)
}

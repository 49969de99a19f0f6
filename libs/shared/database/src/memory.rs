use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::store::{document_id, LockLease, RecordStore};

type Collection = BTreeMap<Uuid, Value>;
type LockTable = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Process-local record store. Used for development and tests, and as the
/// default backend when no remote store is configured.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    locks: LockTable,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

struct MemoryLease {
    key: String,
    guard: OwnedMutexGuard<()>,
    locks: LockTable,
}

/// Drops the slot for `key` once nothing but the table references it.
fn prune_slot(locks: &mut HashMap<String, Arc<Mutex<()>>>, key: &str) {
    if locks.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        locks.remove(key);
    }
}

#[async_trait]
impl LockLease for MemoryLease {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self: Box<Self>) -> StoreResult<()> {
        let MemoryLease { key, guard, locks } = *self;
        debug!("Releasing lock {}", key);

        let mut table = locks.lock().await;
        drop(guard);
        prune_slot(&mut table, &key);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().await;
        let matched: Vec<Value> = collections
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default();

        Ok(filter.apply_page(matched))
    }

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(&id)).cloned())
    }

    async fn insert(&self, collection: &str, document: Value) -> StoreResult<Value> {
        let id = document_id(&document)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id,
            });
        }

        docs.insert(id, document.clone());
        debug!("Inserted {} into {}", id, collection);
        Ok(document)
    }

    async fn update_by_id(&self, collection: &str, id: Uuid, patch: Value) -> StoreResult<Value> {
        let Value::Object(changes) = patch else {
            return Err(StoreError::InvalidDocument("patch must be an object".to_string()));
        };

        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;

        if let Value::Object(fields) = document {
            for (key, value) in changes {
                if key != "id" {
                    fields.insert(key, value);
                }
            }
        }

        Ok(document.clone())
    }

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Value> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(&id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })
    }

    async fn acquire_lock(&self, key: &str, wait: Duration) -> StoreResult<Box<dyn LockLease>> {
        let slot = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = match tokio::time::timeout(wait, slot.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                prune_slot(&mut *self.locks.lock().await, key);
                return Err(StoreError::Timeout(format!("lock {}", key)));
            }
        };

        debug!("Acquired lock {}", key);
        Ok(Box::new(MemoryLease {
            key: key.to_string(),
            guard,
            locks: self.locks.clone(),
        }))
    }
}

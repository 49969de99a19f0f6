use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;

/// Advisory lock held while a check-then-write sequence runs.
///
/// Leases must be released explicitly; backends that hold remote locks
/// also expire them after a TTL so a crashed holder cannot wedge a key.
#[async_trait]
pub trait LockLease: Send {
    fn key(&self) -> &str;

    async fn release(self: Box<Self>) -> StoreResult<()>;
}

/// Document store with one collection per entity type.
///
/// Documents are JSON objects carrying a string `id` field holding a UUID.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>>;

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Value>>;

    async fn insert(&self, collection: &str, document: Value) -> StoreResult<Value>;

    /// Shallow-merges `patch` into the stored document.
    async fn update_by_id(&self, collection: &str, id: Uuid, patch: Value) -> StoreResult<Value>;

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Value>;

    /// Waits at most `wait` for exclusive ownership of `key`.
    async fn acquire_lock(&self, key: &str, wait: Duration) -> StoreResult<Box<dyn LockLease>>;
}

pub fn document_id(document: &Value) -> StoreResult<Uuid> {
    document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("document has no string id".to_string()))?
        .parse()
        .map_err(|_| StoreError::InvalidDocument("document id is not a UUID".to_string()))
}

pub fn to_document<T: Serialize>(record: &T) -> StoreResult<Value> {
    let document = serde_json::to_value(record)?;
    if !document.is_object() {
        return Err(StoreError::InvalidDocument("records must serialize to objects".to_string()));
    }
    Ok(document)
}

pub fn from_document<T: DeserializeOwned>(document: Value) -> StoreResult<T> {
    Ok(serde_json::from_value(document)?)
}

pub fn from_documents<T: DeserializeOwned>(documents: Vec<Value>) -> StoreResult<Vec<T>> {
    documents.into_iter().map(from_document).collect()
}

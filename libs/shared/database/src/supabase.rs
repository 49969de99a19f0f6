use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::store::{document_id, LockLease, RecordStore};

const LOCK_TABLE: &str = "scheduling_locks";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Record store backed by a Supabase (PostgREST) project.
///
/// Each collection maps to a table under `/rest/v1/`. Advisory locks are rows
/// in `scheduling_locks`, whose `lock_key` column must be unique; expired rows
/// are purged before every acquisition attempt.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    anon_key: String,
    lock_ttl: Duration,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.store_timeout_secs))
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            lock_ttl: Duration::from_secs(config.lock_ttl_secs),
        })
    }

    fn get_headers(&self) -> StoreResult<HeaderMap> {
        let key = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| StoreError::Backend("anon key is not a valid header value".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.anon_key))
            .map_err(|_| StoreError::Backend("anon key is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        Ok(headers)
    }

    fn table_path(&self, collection: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/rest/v1/{}", self.base_url, collection)
        } else {
            format!("{}/rest/v1/{}?{}", self.base_url, collection, query)
        }
    }

    async fn request(
        &self,
        method: Method,
        collection: &str,
        query: &str,
        body: Option<Value>,
    ) -> Result<Vec<Value>, RequestFailure> {
        let url = self.table_path(collection, query);
        debug!("Making {} request to {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.get_headers().map_err(RequestFailure::Store)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await.map_err(|e| {
            warn!("Store request to {} failed: {}", url, e);
            RequestFailure::Store(StoreError::Unavailable(e.to_string()))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);
            return Err(RequestFailure::Status(status, error_text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RequestFailure::Store(StoreError::Unavailable(e.to_string())))?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            row @ Value::Object(_) => Ok(vec![row]),
            other => Err(RequestFailure::Store(StoreError::InvalidDocument(format!(
                "unexpected response body: {}",
                other
            )))),
        }
    }

    async fn purge_expired_lock(&self, key: &str) -> StoreResult<()> {
        let query = Filter::new()
            .eq("lock_key", key)
            .lt("expires_at", Utc::now())
            .to_query_string();

        self.request(Method::DELETE, LOCK_TABLE, &query, None)
            .await
            .map(|_| ())
            .map_err(|failure| failure.into_store_error(LOCK_TABLE, None))
    }

    async fn try_acquire(&self, key: &str, holder: Uuid) -> StoreResult<bool> {
        self.purge_expired_lock(key).await?;

        let ttl = chrono::Duration::from_std(self.lock_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let lock_row = json!({
            "lock_key": key,
            "holder": holder,
            "acquired_at": Utc::now(),
            "expires_at": Utc::now() + ttl,
        });

        match self.request(Method::POST, LOCK_TABLE, "", Some(lock_row)).await {
            Ok(_) => Ok(true),
            Err(RequestFailure::Status(StatusCode::CONFLICT, _)) => Ok(false),
            Err(failure) => Err(failure.into_store_error(LOCK_TABLE, None)),
        }
    }
}

enum RequestFailure {
    Status(StatusCode, String),
    Store(StoreError),
}

impl From<serde_json::Error> for RequestFailure {
    fn from(err: serde_json::Error) -> Self {
        RequestFailure::Store(err.into())
    }
}

impl RequestFailure {
    fn into_store_error(self, collection: &str, id: Option<Uuid>) -> StoreError {
        match self {
            RequestFailure::Store(err) => err,
            RequestFailure::Status(status, body) => match (status, id) {
                (StatusCode::CONFLICT, Some(id)) => StoreError::Duplicate {
                    collection: collection.to_string(),
                    id,
                },
                (StatusCode::NOT_FOUND, Some(id)) => StoreError::NotFound {
                    collection: collection.to_string(),
                    id,
                },
                (StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT, _) => {
                    StoreError::Timeout(format!("{} ({})", collection, body))
                }
                (status, _) if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                    StoreError::Unavailable(format!("{}: {}", status, body))
                }
                (status, _) => StoreError::Backend(format!("{}: {}", status, body)),
            },
        }
    }
}

struct SupabaseLease {
    store: SupabaseStore,
    key: String,
    holder: Uuid,
}

#[async_trait]
impl LockLease for SupabaseLease {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self: Box<Self>) -> StoreResult<()> {
        let query = Filter::new()
            .eq("lock_key", &self.key)
            .eq("holder", self.holder)
            .to_query_string();

        self.store
            .request(Method::DELETE, LOCK_TABLE, &query, None)
            .await
            .map(|_| debug!("Scheduling lock released: {}", self.key))
            .map_err(|failure| failure.into_store_error(LOCK_TABLE, None))
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.request(Method::GET, collection, &filter.to_query_string(), None)
            .await
            .map_err(|failure| failure.into_store_error(collection, None))
    }

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Option<Value>> {
        let rows = self.find(collection, &Filter::new().eq("id", id).limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, collection: &str, document: Value) -> StoreResult<Value> {
        let id = document_id(&document)?;
        let rows = self
            .request(Method::POST, collection, "", Some(document))
            .await
            .map_err(|failure| failure.into_store_error(collection, Some(id)))?;

        rows.into_iter().next().ok_or_else(|| {
            StoreError::Backend(format!("insert into {} returned no representation", collection))
        })
    }

    async fn update_by_id(&self, collection: &str, id: Uuid, patch: Value) -> StoreResult<Value> {
        let query = Filter::new().eq("id", id).to_query_string();
        let rows = self
            .request(Method::PATCH, collection, &query, Some(patch))
            .await
            .map_err(|failure| failure.into_store_error(collection, Some(id)))?;

        rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id,
        })
    }

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Value> {
        let query = Filter::new().eq("id", id).to_query_string();
        let rows = self
            .request(Method::DELETE, collection, &query, None)
            .await
            .map_err(|failure| failure.into_store_error(collection, Some(id)))?;

        rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id,
        })
    }

    async fn acquire_lock(&self, key: &str, wait: Duration) -> StoreResult<Box<dyn LockLease>> {
        let holder = Uuid::new_v4();
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if self.try_acquire(key, holder).await? {
                debug!("Scheduling lock acquired: {}", key);
                return Ok(Box::new(SupabaseLease {
                    store: self.clone(),
                    key: key.to_string(),
                    holder,
                }));
            }

            if tokio::time::Instant::now() + LOCK_RETRY_INTERVAL > deadline {
                warn!("Gave up waiting for scheduling lock {}", key);
                return Err(StoreError::Timeout(format!("lock {}", key)));
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }
}

//! HTTP/JSON record service client.
//!
//! Each collection lives at `{base_url}/{collection}.php`:
//!
//! | Operation            | Request                                   |
//! |----------------------|-------------------------------------------|
//! | `list`               | `GET`                                     |
//! | `create`             | `POST` with the fields as a JSON object   |
//! | `delete`             | `DELETE` with body `{"id": …}`            |
//! | `delete_all`         | `DELETE ?action=deleteAll`                |
//! | `update_rank`        | `PUT` on prizes with `{"id": …, "ranking": …}` |
//!
//! Idempotent calls are retried on transport errors and 5xx answers. Creates
//! are never retried, since a lost response would otherwise store the record
//! twice.

use raffle_core::record_store::{
    Collection, Fields, Operation, Record, RecordId, RecordStore, RecordStoreError, StoreFuture,
};
use raffle_runtime::retry::{retry_transient, RetryPolicy};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;

fn transport(error: &reqwest::Error) -> RecordStoreError {
    RecordStoreError::Unavailable(error.to_string())
}

/// Numeric ids go back to the service as numbers, anything else as a string
fn id_json(id: &RecordId) -> Value {
    id.as_str()
        .parse::<u64>()
        .map_or_else(|_| Value::from(id.as_str()), Value::from)
}

async fn ensure_success(
    operation: Operation,
    collection: Collection,
    response: Response,
) -> Result<Response, RecordStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RecordStoreError::Rejected {
        operation,
        collection,
        status: status.as_u16(),
        message,
    })
}

/// [`RecordStore`] backed by the REST record service
#[derive(Clone, Debug)]
pub struct RestRecordStore {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RestRecordStore {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, RecordStoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(&e))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!(%base_url, "Using REST record service");
        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    fn endpoint(&self, collection: Collection) -> String {
        format!("{}/{}.php", self.base_url, collection.as_str())
    }

    /// Sends a request and checks its status
    async fn call(
        operation: Operation,
        collection: Collection,
        request: RequestBuilder,
    ) -> Result<Response, RecordStoreError> {
        tracing::debug!(%operation, %collection, "Record service call");
        let response = request.send().await.map_err(|e| transport(&e))?;
        ensure_success(operation, collection, response).await
    }

    async fn json_body(collection: Collection, response: Response) -> Result<Value, RecordStoreError> {
        let text = response.text().await.map_err(|e| transport(&e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RecordStoreError::InvalidRecord {
            collection,
            reason: format!("response is not JSON: {e}"),
        })
    }

    async fn list_once(&self, collection: Collection) -> Result<Vec<Record>, RecordStoreError> {
        let response = Self::call(
            Operation::List,
            collection,
            self.client.get(self.endpoint(collection)),
        )
        .await?;
        let Value::Array(items) = Self::json_body(collection, response).await? else {
            tracing::warn!(%collection, "List response is not an array, treating as empty");
            return Ok(Vec::new());
        };
        items
            .into_iter()
            .map(|item| Record::from_json(collection, item))
            .collect()
    }

    /// Finds a just-created record when the service did not echo its id.
    ///
    /// Picks the most recent stored record that agrees with every sent field
    /// it stores. Columns the service does not keep are ignored.
    async fn locate_created(
        &self,
        collection: Collection,
        fields: &Fields,
    ) -> Result<Record, RecordStoreError> {
        let records = self.list_once(collection).await?;
        records
            .into_iter()
            .rev()
            .find(|record| {
                fields.keys().any(|key| record.fields.contains_key(key))
                    && fields.iter().all(|(key, sent)| {
                        record
                            .fields
                            .get(key)
                            .is_none_or(|stored| same_value(stored, sent))
                    })
            })
            .ok_or_else(|| RecordStoreError::InvalidRecord {
                collection,
                reason: "created record not found".to_string(),
            })
    }

    async fn create_once(
        &self,
        collection: Collection,
        fields: Fields,
    ) -> Result<Record, RecordStoreError> {
        let response = Self::call(
            Operation::Create,
            collection,
            self.client.post(self.endpoint(collection)).json(&fields),
        )
        .await?;

        let echoed = match Self::json_body(collection, response).await? {
            Value::Object(map) => map,
            other => RecordId::from_json(&other)
                .map(|id| {
                    let mut map = Fields::new();
                    map.insert("id".to_string(), Value::from(id.as_str()));
                    map
                })
                .unwrap_or_default(),
        };

        match echoed.get("id").and_then(RecordId::from_json) {
            Some(id) => {
                let mut merged = fields;
                merged.extend(echoed);
                Ok(Record::new(id, merged))
            },
            None => self.locate_created(collection, &fields).await,
        }
    }
}

/// Loose equality: some services return every column as text
fn same_value(stored: &Value, sent: &Value) -> bool {
    match (stored, sent) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim() == n.to_string()
        },
        _ => stored == sent,
    }
}

impl RecordStore for RestRecordStore {
    fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Record>> {
        Box::pin(retry_transient(
            &self.retry,
            "record_service.list",
            move || self.list_once(collection),
            RecordStoreError::is_transient,
        ))
    }

    fn create(&self, collection: Collection, fields: Fields) -> StoreFuture<'_, Record> {
        Box::pin(self.create_once(collection, fields))
    }

    fn delete(&self, collection: Collection, id: RecordId) -> StoreFuture<'_, ()> {
        Box::pin(retry_transient(
            &self.retry,
            "record_service.delete",
            move || {
                let request = self
                    .client
                    .delete(self.endpoint(collection))
                    .json(&json!({ "id": id_json(&id) }));
                async move {
                    Self::call(Operation::Delete, collection, request)
                        .await
                        .map(|_| ())
                }
            },
            RecordStoreError::is_transient,
        ))
    }

    fn delete_all(&self, collection: Collection) -> StoreFuture<'_, ()> {
        Box::pin(retry_transient(
            &self.retry,
            "record_service.delete_all",
            move || {
                let request = self
                    .client
                    .delete(self.endpoint(collection))
                    .query(&[("action", "deleteAll")]);
                async move {
                    Self::call(Operation::DeleteAll, collection, request)
                        .await
                        .map(|_| ())
                }
            },
            RecordStoreError::is_transient,
        ))
    }

    fn update_rank(&self, id: RecordId, rank: u32) -> StoreFuture<'_, ()> {
        Box::pin(retry_transient(
            &self.retry,
            "record_service.update_rank",
            move || {
                let request = self
                    .client
                    .put(self.endpoint(Collection::Prizes))
                    .json(&json!({ "id": id_json(&id), "ranking": rank }));
                async move {
                    Self::call(Operation::UpdateRank, Collection::Prizes, request)
                        .await
                        .map(|_| ())
                }
            },
            RecordStoreError::is_transient,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::{Query, State},
        http::{Method, StatusCode},
        routing::any,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Minimal stand-in for the PHP record service
    #[derive(Clone, Default)]
    struct Backend {
        rows: Arc<Mutex<Vec<Value>>>,
        next_id: Arc<AtomicUsize>,
        /// Number of upcoming requests answered with 503
        outages: Arc<AtomicUsize>,
        /// Whether POST echoes the stored record or only `{"success": true}`
        echo_created: bool,
    }

    async fn handle(
        State(backend): State<Backend>,
        method: Method,
        Query(query): Query<HashMap<String, String>>,
        body: Bytes,
    ) -> (StatusCode, Json<Value>) {
        if backend
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "busy"})));
        }

        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let mut rows = backend.rows.lock().unwrap();
        match method {
            Method::GET => (StatusCode::OK, Json(Value::Array(rows.clone()))),
            Method::POST => {
                let id = backend.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let mut row = body;
                row["id"] = json!(id);
                rows.push(row.clone());
                if backend.echo_created {
                    (StatusCode::OK, Json(row))
                } else {
                    (StatusCode::OK, Json(json!({"success": true})))
                }
            },
            Method::DELETE if query.get("action").map(String::as_str) == Some("deleteAll") => {
                rows.clear();
                (StatusCode::OK, Json(json!({"success": true})))
            },
            Method::DELETE => {
                let before = rows.len();
                rows.retain(|row| row["id"] != body["id"]);
                if rows.len() == before {
                    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
                } else {
                    (StatusCode::OK, Json(json!({"success": true})))
                }
            },
            Method::PUT => {
                for row in rows.iter_mut().filter(|row| row["id"] == body["id"]) {
                    row["ranking"] = body["ranking"].clone();
                }
                (StatusCode::OK, Json(json!({"success": true})))
            },
            _ => (StatusCode::METHOD_NOT_ALLOWED, Json(Value::Null)),
        }
    }

    async fn serve(backend: Backend) -> RestRecordStore {
        let app = Router::new()
            .route("/api/prizes.php", any(handle))
            .with_state(backend);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let retry = RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(1))
            .build();
        RestRecordStore::new(format!("http://{addr}/api/"), Duration::from_secs(5), retry).unwrap()
    }

    fn prize_fields(name: &str, ranking: u32) -> Fields {
        match json!({"name": name, "ranking": ranking}) {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[tokio::test]
    async fn create_list_update_delete_round_trip() {
        let store = serve(Backend {
            echo_created: true,
            ..Backend::default()
        })
        .await;

        let gold = store.create(Collection::Prizes, prize_fields("Gold", 1)).await.unwrap();
        let silver = store.create(Collection::Prizes, prize_fields("Silver", 2)).await.unwrap();
        assert_eq!(gold.id, RecordId::new("1"));

        store.update_rank(silver.id.clone(), 1).await.unwrap();
        let listed = store.list(Collection::Prizes).await.unwrap();
        assert_eq!(listed[1].u32_field(Collection::Prizes, "ranking").unwrap(), 1);

        store.delete(Collection::Prizes, gold.id).await.unwrap();
        assert_eq!(store.list(Collection::Prizes).await.unwrap().len(), 1);

        store.delete_all(Collection::Prizes).await.unwrap();
        assert!(store.list(Collection::Prizes).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_without_echo_finds_the_new_record() {
        let store = serve(Backend::default()).await;
        store.create(Collection::Prizes, prize_fields("Gold", 1)).await.unwrap();
        let second = store.create(Collection::Prizes, prize_fields("Gold", 2)).await.unwrap();

        assert_eq!(second.id, RecordId::new("2"));
        assert_eq!(second.str_field(Collection::Prizes, "name").unwrap(), "Gold");
    }

    #[tokio::test]
    async fn list_retries_through_a_short_outage() {
        let backend = Backend::default();
        backend.outages.store(2, Ordering::SeqCst);
        let store = serve(backend).await;

        assert!(store.list(Collection::Prizes).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_is_not_retried() {
        let backend = Backend::default();
        backend.outages.store(1, Ordering::SeqCst);
        let store = serve(backend.clone()).await;

        let err = store
            .create(Collection::Prizes, prize_fields("Gold", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordStoreError::Rejected { status: 503, .. }));
        assert!(backend.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_delete_is_rejected_without_retry() {
        let store = serve(Backend::default()).await;
        let err = store
            .delete(Collection::Prizes, RecordId::new("42"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordStoreError::Rejected {
                operation: Operation::Delete,
                status: 404,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let store = RestRecordStore::new(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            RetryPolicy::none(),
        )
        .unwrap();
        let err = store.list(Collection::Winners).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::Unavailable(_)));
    }

    #[test]
    fn numeric_ids_are_sent_as_numbers() {
        assert_eq!(id_json(&RecordId::new("7")), json!(7));
        assert_eq!(id_json(&RecordId::new("a7")), json!("a7"));
        assert!(same_value(&json!("2"), &json!(2)));
        assert!(!same_value(&json!("Gold"), &json!("Silver")));
    }
}

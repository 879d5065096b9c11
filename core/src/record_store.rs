//! Record store trait and related types for the persistence collaborator.
//!
//! The raffle engine never owns durable storage. It mirrors three collections
//! (participants, prizes, winners) kept by an external record service and talks
//! to it through exactly five operation shapes:
//!
//! - `list(collection)`
//! - `create(collection, fields)`
//! - `delete(collection, id)`
//! - `delete_all(collection)`
//! - `update_rank(prize_id, rank)` (prizes only)
//!
//! # Implementations
//!
//! - `RestRecordStore` (in the `raffle` crate): HTTP/JSON transport
//! - `InMemoryRecordStore` (in `raffle-testing`): fast, deterministic, with failure injection
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! so it can be held as `Arc<dyn RecordStore>` and captured by effects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Field map of a record, exactly as the record service sees it.
pub type Fields = Map<String, Value>;

/// Boxed future returned by every [`RecordStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RecordStoreError>> + Send + 'a>>;

/// The three record collections mirrored by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Registered participants, insertion ordered
    Participants,
    /// Prizes, ordered by their stored ranking
    Prizes,
    /// Winner history, draw ordered
    Winners,
}

impl Collection {
    /// All collections, in the order a full reset clears them.
    pub const ALL: [Self; 3] = [Self::Participants, Self::Prizes, Self::Winners];

    /// Lowercase collection name, used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Participants => "participants",
            Self::Prizes => "prizes",
            Self::Winners => "winners",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record store operation shapes, used for metric labels and failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list(collection)`
    List,
    /// `create(collection, fields)`
    Create,
    /// `delete(collection, id)`
    Delete,
    /// `delete_all(collection)`
    DeleteAll,
    /// `update_rank(id, rank)`
    UpdateRank,
}

impl Operation {
    /// Snake-case operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::DeleteAll => "delete_all",
            Self::UpdateRank => "update_rank",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier assigned by the record service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts a JSON `id` value (number or string) into a `RecordId`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A stored record: service-assigned id plus its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Identifier assigned by the record service
    pub id: RecordId,
    /// Record fields (never contains `id`)
    pub fields: Fields,
}

impl Record {
    /// Creates a record, dropping any `id` entry from `fields`.
    #[must_use]
    pub fn new(id: RecordId, mut fields: Fields) -> Self {
        fields.remove("id");
        Self { id, fields }
    }

    /// Splits a JSON object carrying an `id` entry into a record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidRecord`] if `value` is not an object
    /// or has no usable `id`.
    pub fn from_json(collection: Collection, value: Value) -> Result<Self, RecordStoreError> {
        let Value::Object(fields) = value else {
            return Err(RecordStoreError::InvalidRecord {
                collection,
                reason: "record is not a JSON object".to_string(),
            });
        };
        let id = fields
            .get("id")
            .and_then(RecordId::from_json)
            .ok_or_else(|| RecordStoreError::InvalidRecord {
                collection,
                reason: "record has no id".to_string(),
            })?;
        Ok(Self::new(id, fields))
    }

    /// Reads a string field.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidRecord`] if the field is missing or not a string.
    pub fn str_field(&self, collection: Collection, key: &str) -> Result<&str, RecordStoreError> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| RecordStoreError::InvalidRecord {
                collection,
                reason: format!("field `{key}` missing or not a string"),
            })
    }

    /// Reads an unsigned integer field. Numeric strings are accepted since
    /// some backends return every column as text.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidRecord`] if the field is missing or not numeric.
    pub fn u32_field(&self, collection: Collection, key: &str) -> Result<u32, RecordStoreError> {
        let parsed = match self.fields.get(key) {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| RecordStoreError::InvalidRecord {
            collection,
            reason: format!("field `{key}` missing or not an unsigned integer"),
        })
    }
}

/// Errors that can occur during record store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    /// The record service could not be reached or the transport failed.
    #[error("Record service unavailable: {0}")]
    Unavailable(String),

    /// The record service answered with a failure status.
    #[error("Record service rejected {operation} on {collection} (status {status}): {message}")]
    Rejected {
        /// Operation that was rejected
        operation: Operation,
        /// Target collection
        collection: Collection,
        /// Status code reported by the service
        status: u16,
        /// Message reported by the service
        message: String,
    },

    /// The addressed record does not exist.
    #[error("Record {id} not found in {collection}")]
    NotFound {
        /// Target collection
        collection: Collection,
        /// Missing record id
        id: RecordId,
    },

    /// A record returned by the service could not be interpreted.
    #[error("Invalid {collection} record: {reason}")]
    InvalidRecord {
        /// Collection the record came from
        collection: Collection,
        /// What was wrong with it
        reason: String,
    },

    /// A multi-step write failed and undoing its completed steps failed too.
    ///
    /// The record service may now disagree with the in-memory mirror until the
    /// next full load.
    #[error("{original}; rollback also failed: {rollback}")]
    RollbackFailed {
        /// The failure that aborted the write
        original: Box<RecordStoreError>,
        /// The failure hit while undoing it
        rollback: Box<RecordStoreError>,
    },
}

impl RecordStoreError {
    /// Whether retrying the same call may succeed (transport trouble or a 5xx answer).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::InvalidRecord { .. } | Self::RollbackFailed { .. } => false,
        }
    }
}

/// Persistence collaborator for the raffle engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: effects capture an
/// `Arc<dyn RecordStore>` and run on the tokio runtime.
pub trait RecordStore: Send + Sync {
    /// List every record of a collection in its stored order.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or answers with bad data.
    fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Record>>;

    /// Create a record and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or refuses the record.
    fn create(&self, collection: Collection, fields: Fields) -> StoreFuture<'_, Record>;

    /// Delete one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or the record is unknown.
    fn delete(&self, collection: Collection, id: RecordId) -> StoreFuture<'_, ()>;

    /// Delete every record of a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable.
    fn delete_all(&self, collection: Collection) -> StoreFuture<'_, ()>;

    /// Store a new ranking for a prize.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or the prize is unknown.
    fn update_rank(&self, id: RecordId, rank: u32) -> StoreFuture<'_, ()>;
}

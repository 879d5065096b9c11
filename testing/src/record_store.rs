//! In-memory record store for fast, deterministic testing.
//!
//! Mirrors the behaviour of the HTTP record service closely enough for the
//! engine: ids are assigned on create, prizes are listed by their stored
//! ranking, deleting an unknown id is an error. Failures can be injected per
//! operation and collection to exercise fail-closed paths.

use raffle_core::record_store::{
    Collection, Fields, Operation, Record, RecordId, RecordStore, RecordStoreError, StoreFuture,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// When an injected failure fires.
#[derive(Clone, Copy, Debug)]
enum Trigger {
    /// Every matching call fails
    Always,
    /// Let `remaining` matching calls through, fail the next one, then disarm
    Once { remaining: usize },
}

#[derive(Clone, Debug)]
struct FailureRule {
    operation: Operation,
    collection: Collection,
    trigger: Trigger,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<Collection, Vec<Record>>,
    next_id: u64,
    rules: Vec<FailureRule>,
    calls: Vec<(Operation, Collection)>,
}

impl Inner {
    /// Records the call and decides whether an injected failure fires.
    fn check(&mut self, operation: Operation, collection: Collection) -> Result<(), RecordStoreError> {
        self.calls.push((operation, collection));

        let mut fire = false;
        self.rules.retain_mut(|rule| {
            if fire || rule.operation != operation || rule.collection != collection {
                return true;
            }
            match &mut rule.trigger {
                Trigger::Always => {
                    fire = true;
                    true
                },
                Trigger::Once { remaining: 0 } => {
                    fire = true;
                    false
                },
                Trigger::Once { remaining } => {
                    *remaining -= 1;
                    true
                },
            }
        });

        if fire {
            return Err(RecordStoreError::Unavailable(format!(
                "injected failure: {operation} on {collection}"
            )));
        }
        Ok(())
    }

    fn records(&mut self, collection: Collection) -> &mut Vec<Record> {
        self.collections.entry(collection).or_default()
    }

    fn insert(&mut self, collection: Collection, fields: Fields) -> Record {
        self.next_id += 1;
        let record = Record::new(RecordId::new(self.next_id.to_string()), fields);
        self.records(collection).push(record.clone());
        record
    }
}

/// In-memory [`RecordStore`] with failure injection and a call journal.
///
/// Cloning shares the underlying data, so a test can keep a handle while the
/// engine owns another.
///
/// # Example
///
/// ```
/// use raffle_testing::InMemoryRecordStore;
/// use raffle_core::record_store::{Collection, Operation, RecordStore};
///
/// # async fn example() {
/// let records = InMemoryRecordStore::new();
/// records.fail_on(Operation::Create, Collection::Winners);
///
/// let result = records.create(Collection::Winners, Default::default()).await;
/// assert!(result.is_err());
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRecordStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record directly, bypassing failure injection and the journal
    pub fn seed(&self, collection: Collection, fields: Fields) -> Record {
        self.lock().insert(collection, fields)
    }

    /// Current records of a collection, in the order `list` would return them
    #[must_use]
    pub fn records(&self, collection: Collection) -> Vec<Record> {
        let mut inner = self.lock();
        let mut records = inner.records(collection).clone();
        if collection == Collection::Prizes {
            records.sort_by_key(ranking_of);
        }
        records
    }

    /// Make every `operation` on `collection` fail until [`Self::clear_failures`]
    pub fn fail_on(&self, operation: Operation, collection: Collection) {
        self.lock().rules.push(FailureRule {
            operation,
            collection,
            trigger: Trigger::Always,
        });
    }

    /// Let `successes` matching calls succeed, fail the next one, then behave normally
    pub fn fail_once_after(&self, operation: Operation, collection: Collection, successes: usize) {
        self.lock().rules.push(FailureRule {
            operation,
            collection,
            trigger: Trigger::Once {
                remaining: successes,
            },
        });
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        self.lock().rules.clear();
    }

    /// Every operation attempted so far, including failed ones
    #[must_use]
    pub fn calls(&self) -> Vec<(Operation, Collection)> {
        self.lock().calls.clone()
    }
}

fn ranking_of(record: &Record) -> u64 {
    match record.fields.get("ranking") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(u64::MAX),
        Some(Value::String(s)) => s.parse().unwrap_or(u64::MAX),
        _ => u64::MAX,
    }
}

impl RecordStore for InMemoryRecordStore {
    fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Record>> {
        Box::pin(async move {
            self.lock().check(Operation::List, collection)?;
            Ok(self.records(collection))
        })
    }

    fn create(&self, collection: Collection, fields: Fields) -> StoreFuture<'_, Record> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.check(Operation::Create, collection)?;
            Ok(inner.insert(collection, fields))
        })
    }

    fn delete(&self, collection: Collection, id: RecordId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.check(Operation::Delete, collection)?;
            let records = inner.records(collection);
            let Some(position) = records.iter().position(|r| r.id == id) else {
                return Err(RecordStoreError::NotFound { collection, id });
            };
            records.remove(position);
            Ok(())
        })
    }

    fn delete_all(&self, collection: Collection) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.check(Operation::DeleteAll, collection)?;
            inner.records(collection).clear();
            Ok(())
        })
    }

    fn update_rank(&self, id: RecordId, rank: u32) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.check(Operation::UpdateRank, Collection::Prizes)?;
            let Some(record) = inner.records(Collection::Prizes).iter_mut().find(|r| r.id == id)
            else {
                return Err(RecordStoreError::NotFound {
                    collection: Collection::Prizes,
                    id,
                });
            };
            record.fields.insert("ranking".to_string(), Value::from(rank));
            Ok(())
        })
    }
}

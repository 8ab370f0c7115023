//! In-process record storage.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{Missing, StoredRecord};
use crate::error::{AppError, Result};

type Slot = Arc<Mutex<Option<StoredRecord>>>;

/// Records kept in memory, one lock per record.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<(String, String), Slot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn slot(&self, collection: &str, record_id: &str) -> Option<Slot> {
        self.records
            .get(&(collection.to_string(), record_id.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a slot that never received a record, unless another task is
    /// already waiting on it.
    fn discard_empty(&self, collection: &str, record_id: &str, slot: &Slot) {
        let key = (collection.to_string(), record_id.to_string());
        // one reference held by the map, one by the caller
        self.records.remove_if(&key, |_, current| {
            Arc::ptr_eq(current, slot) && Arc::strong_count(current) == 2
        });
    }

    /// Read a record.
    pub async fn fetch(&self, collection: &str, record_id: &str) -> Option<StoredRecord> {
        let slot = self.slot(collection, record_id)?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Change a record while holding its lock.
    pub async fn mutate<T, F>(
        &self,
        collection: &str,
        record_id: &str,
        missing: Missing,
        apply: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut StoredRecord) -> Result<T>,
    {
        let not_found = || AppError::NotFound(format!("record {}/{}", collection, record_id));

        // the map guard must be gone before awaiting the record lock
        let slot = match missing {
            Missing::Create => Arc::clone(
                self.records
                    .entry((collection.to_string(), record_id.to_string()))
                    .or_default()
                    .value(),
            ),
            Missing::Reject => self.slot(collection, record_id).ok_or_else(not_found)?,
        };

        let mut guard = slot.lock().await;
        let mut stored = match (guard.as_ref(), missing) {
            (Some(existing), _) => existing.clone(),
            (None, Missing::Create) => StoredRecord::default(),
            (None, Missing::Reject) => return Err(not_found()),
        };

        let output = match apply(&mut stored) {
            Ok(output) => output,
            Err(err) => {
                if guard.is_none() {
                    self.discard_empty(collection, record_id, &slot);
                }
                return Err(err);
            }
        };
        *guard = Some(stored);
        tracing::debug!(collection, record_id, "record saved");

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_fetch() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch("notes", "1").await, None);

        store
            .mutate("notes", "1", Missing::Create, |record| {
                record.state.insert("title".into(), json!("hello"));
                Ok(())
            })
            .await
            .unwrap();

        let stored = store.fetch("notes", "1").await.unwrap();
        assert_eq!(stored.state["title"], "hello");
    }

    #[tokio::test]
    async fn reject_missing_record() {
        let store = MemoryStore::new();
        let result = store
            .mutate("notes", "1", Missing::Reject, |_| Ok(()))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_mutation_writes_nothing() {
        let store = MemoryStore::new();
        store
            .mutate("notes", "1", Missing::Create, |record| {
                record.state.insert("n".into(), json!(1));
                Ok(())
            })
            .await
            .unwrap();

        let result: Result<()> = store
            .mutate("notes", "1", Missing::Reject, |record| {
                record.state.insert("n".into(), json!(2));
                Err(AppError::BadRequest("nope".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.fetch("notes", "1").await.unwrap().state["n"], 1);
    }

    #[tokio::test]
    async fn failed_create_leaves_no_slot() {
        let store = MemoryStore::new();
        let result: Result<()> = store
            .mutate("notes", "1", Missing::Create, |_| {
                Err(AppError::BadRequest("nope".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(store.records.is_empty());
        assert_eq!(store.fetch("notes", "1").await, None);

        let result = store
            .mutate("notes", "1", Missing::Reject, |_| Ok(()))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_writers_serialize() {
        let store = MemoryStore::new_shared();
        let mut handles = Vec::new();

        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .mutate("counters", "c", Missing::Create, |record| {
                        let n = record.state.get("n").and_then(|v| v.as_u64()).unwrap_or(0);
                        record.state.insert("n".into(), json!(n + 1));
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.fetch("counters", "c").await.unwrap().state["n"], 32);
    }
}

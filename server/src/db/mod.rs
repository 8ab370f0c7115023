//! Record storage.
//!
//! Two backends sit behind [`Repository`]: PostgreSQL for real deployments
//! and an in-process map for development and tests. Both run every mutation
//! inside a per-record critical section, so concurrent writers to the same
//! record never interleave their read-modify-write.

mod memory;
mod pool;
mod records;

pub use memory::*;
pub use pool::*;

use std::sync::Arc;

use serde_json::Value;
use verlog_engine::{State, Version};

use crate::error::Result;

/// A record as it is stored: the state and its serialized log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRecord {
    pub state: State,
    pub log_data: Option<Value>,
    /// Current version of the log, kept beside it for queries
    pub version: Option<Version>,
}

/// Whether a mutation may bring a missing record into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Create,
    Reject,
}

/// Storage backend, selected once at startup.
#[derive(Clone)]
pub enum Repository {
    Postgres(Pool),
    Memory(Arc<MemoryStore>),
}

impl Repository {
    /// In-memory repository.
    pub fn memory() -> Self {
        Repository::Memory(MemoryStore::new_shared())
    }

    /// Read a record without locking it.
    pub async fn fetch(&self, collection: &str, record_id: &str) -> Result<Option<StoredRecord>> {
        match self {
            Repository::Postgres(pool) => records::get_record(pool, collection, record_id).await,
            Repository::Memory(store) => Ok(store.fetch(collection, record_id).await),
        }
    }

    /// Read, change and write back a record under its lock.
    ///
    /// Nothing is written if `apply` fails.
    pub async fn mutate<T, F>(
        &self,
        collection: &str,
        record_id: &str,
        missing: Missing,
        apply: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut StoredRecord) -> Result<T> + Send,
        T: Send,
    {
        match self {
            Repository::Postgres(pool) => {
                records::mutate_record(pool, collection, record_id, missing, apply).await
            }
            Repository::Memory(store) => store.mutate(collection, record_id, missing, apply).await,
        }
    }
}

//! Replica metadata store contract and the in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::record::ReplicaRecord;

/// Durable keyed storage for replica records, with an advisory lock used to
/// serialize get-modify-set sequences across tasks.
///
/// The store is process-local. `lock` blocks until the lock is acquired;
/// `unlock` must only be called by the current holder, and every code path
/// between the two must stay short.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// All stored reference IDs.
    async fn list(&self) -> Vec<String>;

    /// The record stored under `reference_id`, if any.
    async fn get(&self, reference_id: &str) -> Option<ReplicaRecord>;

    /// Stores a record under `reference_id`; `None` deletes it.
    async fn set(&self, reference_id: &str, record: Option<ReplicaRecord>);

    /// Acquires the advisory store lock, waiting until it is free.
    async fn lock(&self);

    /// Releases the advisory store lock.
    fn unlock(&self);
}

/// In-memory [`ReplicaStore`]. Records are kept serialized, as a durable
/// store would keep them on disk.
pub struct MemoryStore {
    records: DashMap<String, String>,
    mutex: Semaphore,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            mutex: Semaphore::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplicaStore for MemoryStore {
    async fn list(&self) -> Vec<String> {
        self.records.iter().map(|e| e.key().clone()).collect()
    }

    async fn get(&self, reference_id: &str) -> Option<ReplicaRecord> {
        let raw = self.records.get(reference_id)?;
        match serde_json::from_str(raw.value()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(reference_id, error = %e, "unreadable replica record");
                None
            }
        }
    }

    async fn set(&self, reference_id: &str, record: Option<ReplicaRecord>) {
        match record {
            Some(record) => match serde_json::to_string(&record) {
                Ok(raw) => {
                    self.records.insert(reference_id.to_string(), raw);
                }
                Err(e) => warn!(reference_id, error = %e, "failed to serialize replica record"),
            },
            None => {
                self.records.remove(reference_id);
            }
        }
    }

    async fn lock(&self) {
        if let Ok(permit) = self.mutex.acquire().await {
            permit.forget();
        }
    }

    fn unlock(&self) {
        self.mutex.add_permits(1);
    }
}

//! The changed-set: reference IDs awaiting a state report.
//!
//! An append-only multiset fed by every successful state change and drained
//! destructively by the reporting loop. It has its own synchronization,
//! independent of the store lock: producers append from any task, and the
//! drain is an atomic swap-and-clear so nothing appended concurrently is
//! lost.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Synchronized multiset of reference IDs with a changed, unreported state.
#[derive(Default)]
pub struct ChangedSet {
    entries: Mutex<Vec<String>>,
    notify: Notify,
}

impl ChangedSet {
    /// Creates an empty changed-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one reference ID. Duplicates are kept.
    pub fn push(&self, reference_id: impl Into<String>) {
        self.entries.lock().push(reference_id.into());
        self.notify.notify_one();
    }

    /// Appends many reference IDs.
    pub fn extend(&self, reference_ids: impl IntoIterator<Item = String>) {
        let mut entries = self.entries.lock();
        entries.extend(reference_ids);
        drop(entries);
        self.notify.notify_one();
    }

    /// Takes the entire current content, leaving the set empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of queued entries, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Waits until the set is non-empty or `timeout` elapses. Returns whether
    /// the set is non-empty on return.
    pub async fn wait_nonempty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if !self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return !self.is_empty();
            }
        }
    }
}

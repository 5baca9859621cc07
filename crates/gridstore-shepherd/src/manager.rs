//! The shepherd: owner of this storage element's replicas.
//!
//! All replica mutation funnels through [`Shepherd::change_state`], which
//! holds the store lock for the get-modify-set sequence and feeds the
//! changed-set on success. The background loops (checking, reporting,
//! discovery) live in their own modules as further `impl Shepherd` blocks.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gridstore_catalog::{
    BartenderClient, ClientFactory, FileMetadata, LibrarianClient, ReplicaState, ServiceType,
};

use crate::backend::TransferBackend;
use crate::changed::ChangedSet;
use crate::config::ShepherdConfig;
use crate::error::ShepherdError;
use crate::lifecycle::RunState;
use crate::record::ReplicaRecord;
use crate::store::ReplicaStore;

/// Operational counters, exposed as a snapshot through [`Shepherd::stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShepherdStats {
    /// Replicas visited by the checking loop.
    pub replicas_checked: u64,
    /// Checksum mismatches that invalidated a replica.
    pub checksum_mismatches: u64,
    /// Replica records erased after physical removal.
    pub replicas_removed: u64,
    /// Replication slots accepted by the broker.
    pub replication_requests: u64,
    /// State reports delivered to the catalog.
    pub reports_sent: u64,
    /// Full-state resyncs requested by the catalog or forced by failures.
    pub full_resyncs: u64,
}

/// Space accounting for this storage element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceInfo {
    /// Free bytes reported by the backend.
    pub free: u64,
    /// Bytes consumed by stored replicas.
    pub used: u64,
    /// Free plus used.
    pub total: u64,
}

/// The replica manager of one storage element.
pub struct Shepherd {
    pub(crate) config: ShepherdConfig,
    pub(crate) store: Arc<dyn ReplicaStore>,
    pub(crate) backend: Arc<dyn TransferBackend>,
    pub(crate) factory: Arc<dyn ClientFactory>,
    pub(crate) librarian: RwLock<Arc<dyn LibrarianClient>>,
    pub(crate) bartender: RwLock<Arc<dyn BartenderClient>>,
    pub(crate) changed: ChangedSet,
    pub(crate) run: RunState,
    pub(crate) do_reporting: AtomicBool,
    pub(crate) stats: Mutex<ShepherdStats>,
}

impl Shepherd {
    /// Builds a shepherd over its collaborators.
    ///
    /// Fails only on invalid configuration. The changed-set is seeded with
    /// the full store listing so a restarted shepherd re-reports everything
    /// it holds.
    pub async fn new(
        config: ShepherdConfig,
        store: Arc<dyn ReplicaStore>,
        backend: Arc<dyn TransferBackend>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Arc<Self>, ShepherdError> {
        config.validate()?;

        if config.librarian_urls.is_empty() && config.directory_urls.is_empty() {
            warn!("no catalog endpoints and no directory endpoints configured: no self-healing");
        }

        let librarian = factory.librarian(config.librarian_urls.clone());
        let bartender = factory.bartender(config.bartender_urls.clone());

        let shepherd = Arc::new(Self {
            config,
            store,
            backend,
            factory,
            librarian: RwLock::new(librarian),
            bartender: RwLock::new(bartender),
            changed: ChangedSet::new(),
            run: RunState::new(),
            do_reporting: AtomicBool::new(true),
            stats: Mutex::new(ShepherdStats::default()),
        });
        shepherd.changed.extend(shepherd.store.list().await);
        Ok(shepherd)
    }

    /// Spawns the background loops and returns a handle that stops them.
    ///
    /// Discovery loops are only started for catalog roles without static
    /// endpoints, and only when directory endpoints exist.
    pub fn start(self: &Arc<Self>) -> ShepherdHandle {
        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(self.clone().checking_loop()));
        tasks.push(tokio::spawn(self.clone().reporting_loop()));

        if !self.config.directory_urls.is_empty() {
            if self.config.librarian_urls.is_empty() {
                info!("starting librarian discovery");
                tasks.push(tokio::spawn(
                    self.clone().discovery_loop(ServiceType::Librarian),
                ));
            }
            if self.config.bartender_urls.is_empty() {
                info!("starting bartender discovery");
                tasks.push(tokio::spawn(
                    self.clone().discovery_loop(ServiceType::Bartender),
                ));
            }
        }

        ShepherdHandle {
            shepherd: self.clone(),
            tasks,
        }
    }

    /// Flips the run flag; every loop observes it at its next poll boundary.
    pub fn shutdown(&self) {
        self.run.stop();
    }

    /// Whether the background loops are still meant to run.
    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    /// Turns catalog reporting on or off and returns the new setting.
    pub fn toggle_report(&self, enabled: bool) -> bool {
        self.do_reporting.store(enabled, Ordering::Relaxed);
        enabled
    }

    /// Snapshot of the operational counters.
    pub fn stats(&self) -> ShepherdStats {
        self.stats.lock().clone()
    }

    /// The currently installed catalog client.
    pub fn librarian(&self) -> Arc<dyn LibrarianClient> {
        self.librarian.read().clone()
    }

    /// The currently installed broker client.
    pub fn bartender(&self) -> Arc<dyn BartenderClient> {
        self.bartender.read().clone()
    }

    /// Moves a replica to `new_state`.
    ///
    /// The single mutation point for replica state: takes the store lock
    /// around the get-modify-set sequence, releases it on every path, and
    /// appends the reference ID to the changed-set on success. With `only_if`
    /// set, the change applies only when the current state matches; anything
    /// else (including a vanished record) is a no-op returning `false`.
    pub async fn change_state(
        &self,
        reference_id: &str,
        new_state: ReplicaState,
        only_if: Option<ReplicaState>,
    ) -> bool {
        self.store.lock().await;
        let Some(mut record) = self.store.get(reference_id).await else {
            self.store.unlock();
            return false;
        };
        let old_state = record.state;
        if let Some(required) = only_if {
            if old_state != required {
                self.store.unlock();
                return false;
            }
        }
        record.state = new_state;
        self.store.set(reference_id, Some(record)).await;
        self.store.unlock();

        debug!(reference_id, from = %old_state, to = %new_state, "replica state changed");
        self.changed.push(reference_id);
        true
    }

    /// Fetches the catalog metadata for one GUID.
    pub(crate) async fn fetch_metadata(&self, guid: &str) -> Result<FileMetadata, ShepherdError> {
        let guids = [guid.to_string()];
        let mut metadata = self.librarian().get(&guids).await?;
        metadata
            .remove(guid)
            .ok_or_else(|| ShepherdError::MissingMetadata {
                guid: guid.to_string(),
            })
    }

    /// Adopts the catalog's authoritative checksum when it differs from the
    /// locally recorded one. Returns the record to continue with.
    pub(crate) async fn refresh_checksum(
        &self,
        reference_id: &str,
        record: ReplicaRecord,
        metadata: &FileMetadata,
    ) -> ReplicaRecord {
        let catalog_checksum = metadata
            .checksum
            .clone()
            .unwrap_or_else(|| record.checksum.clone());
        let catalog_type = metadata
            .checksum_type
            .clone()
            .unwrap_or_else(|| record.checksum_type.clone());
        if catalog_checksum == record.checksum && catalog_type == record.checksum_type {
            return record;
        }

        self.store.lock().await;
        let Some(mut current) = self.store.get(reference_id).await else {
            self.store.unlock();
            return record;
        };
        current.checksum = catalog_checksum;
        current.checksum_type = catalog_type;
        self.store.set(reference_id, Some(current.clone())).await;
        self.store.unlock();

        debug!(reference_id, checksum = %current.checksum, "authoritative checksum refreshed");
        current
    }

    /// Backend callback for a completed upload.
    ///
    /// The uploader may not have pushed the checksum to the catalog yet, so
    /// this waits through up to three bounded retries (1 s, 2 s, 3 s) for a
    /// non-empty checksum to appear, refreshing the local record each time,
    /// then runs the state machine. A replica still `Creating` although its
    /// checksum is known means verification should have concluded and did
    /// not: it is forced to `Invalid`.
    pub async fn file_arrived(&self, reference_id: &str) {
        let Some(mut record) = self.store.get(reference_id).await else {
            return;
        };
        let guid = record.guid.clone();

        let mut trials = 3u64;
        while !record.checksum_known() && trials > 0 {
            trials -= 1;
            tokio::time::sleep(Duration::from_secs(3 - trials)).await;
            match self.fetch_metadata(&guid).await {
                Ok(metadata) => {
                    record = self.refresh_checksum(reference_id, record, &metadata).await;
                }
                Err(e) => debug!(guid = %guid, error = %e, "checksum propagation poll failed"),
            }
        }

        let state = self.verify_replica(reference_id, &record).await;
        if state == ReplicaState::Creating && record.checksum_known() {
            warn!(reference_id, "upload finished but never verified; invalidating");
            self.change_state(reference_id, ReplicaState::Invalid, None)
                .await;
        }
    }

    /// Free/used/total space accounting for this storage element.
    pub async fn space_information(&self) -> SpaceInfo {
        let free = self.backend.available_space().await.unwrap_or(0);
        let mut used = 0u64;
        for reference_id in self.store.list().await {
            if let Some(record) = self.store.get(&reference_id).await {
                used += record.size;
            }
        }
        SpaceInfo {
            free,
            used,
            total: free + used,
        }
    }
}

/// Running shepherd: the spawned loop tasks plus their stop switch.
pub struct ShepherdHandle {
    shepherd: Arc<Shepherd>,
    tasks: Vec<JoinHandle<()>>,
}

impl ShepherdHandle {
    /// Signals shutdown and waits for every loop to exit.
    pub async fn stop(self) {
        self.shepherd.shutdown();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Tag map sent to the broker for a single-replica request.
pub(crate) fn replication_request(guid: &str) -> HashMap<String, String> {
    HashMap::from([("replicate".to_string(), guid.to_string())])
}

//! Checksum verification and the periodic checking loop.
//!
//! The loop re-derives every replica's state from its checksum and the
//! catalog's view, then heals drift: orphaned and corrupt copies are removed,
//! under-replicated files are offered to the broker, surplus copies are
//! demoted. Failures are isolated per replica; a pass never aborts.

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use gridstore_catalog::{FileMetadata, LocationKey, ReplicaState};

use crate::error::ShepherdError;
use crate::manager::{replication_request, Shepherd};
use crate::record::{unix_secs, ReplicaRecord};

/// Delay before the first checking pass after startup.
const STARTUP_DELAY: Duration = Duration::from_secs(10);

/// What the checksum comparison implies for a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOutcome {
    /// The bytes verify; a not-yet-alive replica becomes `Alive`.
    Promote,
    /// Nothing to do; the prior state stands.
    Unchanged,
    /// Mismatch on an upload still in progress; keep waiting.
    StillCreating,
    /// The upload exceeded the configured creating timeout.
    Stalled,
    /// Mismatch on a previously complete copy; the replica is corrupt.
    Corrupt,
}

/// Pure decision table of the replica state machine.
///
/// `matched` is whether the computed checksum equals the authoritative one;
/// `creating_expired` is whether a configured creating timeout has elapsed
/// since the record was created (always `false` when the timeout is
/// disabled).
pub fn classify_checksum(
    state: ReplicaState,
    matched: bool,
    creating_expired: bool,
) -> ChecksumOutcome {
    if matched {
        return match state {
            ReplicaState::Invalid | ReplicaState::Creating | ReplicaState::Stalled => {
                ChecksumOutcome::Promote
            }
            _ => ChecksumOutcome::Unchanged,
        };
    }
    match state {
        ReplicaState::Creating if creating_expired => ChecksumOutcome::Stalled,
        ReplicaState::Creating => ChecksumOutcome::StillCreating,
        ReplicaState::Deleted | ReplicaState::Stalled => ChecksumOutcome::Unchanged,
        _ => ChecksumOutcome::Corrupt,
    }
}

impl Shepherd {
    /// Runs the state machine over one replica and returns the resulting
    /// state.
    ///
    /// The checksum is recomputed only when the replica is not `Alive` or the
    /// cached value has outlived `checksum_lifetime_secs`; alive files are
    /// assumed not to mutate on disk. A failed recompute counts as
    /// checksum-unknown, which lands in the mismatch branches.
    pub async fn verify_replica(
        &self,
        reference_id: &str,
        record: &ReplicaRecord,
    ) -> ReplicaState {
        let now = unix_secs();
        let cache_stale = record
            .last_checksum_time
            .map_or(true, |t| now.saturating_sub(t) > self.config.checksum_lifetime_secs);

        let current_checksum = if record.state != ReplicaState::Alive || cache_stale {
            match self
                .backend
                .checksum(&record.local_id, &record.checksum_type)
                .await
            {
                Ok(checksum) => {
                    debug!(reference_id, checksum = %checksum, "checksum computed");
                    self.store.lock().await;
                    if let Some(mut current) = self.store.get(reference_id).await {
                        current.last_checksum = Some(checksum.clone());
                        current.last_checksum_time = Some(now);
                        self.store.set(reference_id, Some(current)).await;
                    }
                    self.store.unlock();
                    Some(checksum)
                }
                Err(e) => {
                    debug!(reference_id, error = %e, "checksum computation failed");
                    None
                }
            }
        } else {
            record.last_checksum.clone()
        };

        let matched = current_checksum.as_deref() == Some(record.checksum.as_str());
        let creating_expired = self.config.creating_timeout_secs > 0
            && now.saturating_sub(record.created) > self.config.creating_timeout_secs;

        match classify_checksum(record.state, matched, creating_expired) {
            ChecksumOutcome::Promote => {
                debug!(reference_id, "checksum ok, replica alive");
                self.change_state(reference_id, ReplicaState::Alive, None)
                    .await;
                ReplicaState::Alive
            }
            ChecksumOutcome::Unchanged => record.state,
            ChecksumOutcome::StillCreating => ReplicaState::Creating,
            ChecksumOutcome::Stalled => {
                warn!(reference_id, "upload exceeded creating timeout");
                self.change_state(reference_id, ReplicaState::Stalled, None)
                    .await;
                ReplicaState::Stalled
            }
            ChecksumOutcome::Corrupt => {
                if record.state != ReplicaState::Invalid {
                    warn!(
                        reference_id,
                        expected = %record.checksum,
                        computed = current_checksum.as_deref().unwrap_or(""),
                        "checksum mismatch"
                    );
                    self.stats.lock().checksum_mismatches += 1;
                    self.change_state(reference_id, ReplicaState::Invalid, None)
                        .await;
                }
                ReplicaState::Invalid
            }
        }
    }

    /// One full checking pass over every stored replica, in randomized order
    /// with jittered pacing. Returns the number of replicas visited.
    pub async fn run_check_pass(&self) -> usize {
        let mut reference_ids = self.store.list().await;
        let count = reference_ids.len();
        if count == 0 {
            return 0;
        }

        let interval = Duration::from_millis(
            (self.config.check_period_ms / count as u64).max(self.config.min_check_interval_ms),
        );
        debug!(count, interval_ms = interval.as_millis() as u64, "checking pass");
        reference_ids.shuffle(&mut rand::thread_rng());

        let mut watcher = self.run.watcher();
        let mut alive_guids: Vec<String> = Vec::new();
        for reference_id in reference_ids {
            if !watcher.is_running() {
                break;
            }
            if let Err(e) = self.check_replica(&reference_id, &mut alive_guids).await {
                debug!(reference_id = %reference_id, error = %e, "replica check failed");
            }
            self.stats.lock().replicas_checked += 1;

            // Jittered sleep breaks herd effects across shepherds.
            let jitter = rand::thread_rng().gen_range(0.5..1.5);
            if !watcher.idle(interval.mul_f64(jitter)).await {
                break;
            }
        }
        count
    }

    /// Reconciles one replica against its checksum and the catalog.
    async fn check_replica(
        &self,
        reference_id: &str,
        alive_guids: &mut Vec<String>,
    ) -> Result<(), ShepherdError> {
        let Some(record) = self.store.get(reference_id).await else {
            return Ok(());
        };
        let guid = record.guid.clone();
        let local_id = record.local_id.clone();

        let metadata = self.fetch_metadata(&guid).await?;
        let record = self.refresh_checksum(reference_id, record, &metadata).await;
        let state = self.verify_replica(reference_id, &record).await;

        // The checksum may have taken a while; work from fresh metadata.
        let mut metadata = self.fetch_metadata(&guid).await?;

        match state {
            ReplicaState::Creating | ReplicaState::Alive => {
                if !metadata.is_file() {
                    info!(guid = %guid, reference_id, "catalog dropped this file; removing orphan");
                    self.backend.remove(&local_id).await;
                    self.store.set(reference_id, None).await;
                    self.stats.lock().replicas_removed += 1;
                } else if state == ReplicaState::Alive {
                    if alive_guids.contains(&guid) {
                        info!(guid = %guid, reference_id, "duplicate alive replica; demoting");
                        self.change_state(reference_id, ReplicaState::Deleted, None)
                            .await;
                    } else {
                        self.reconcile_replication(reference_id, &guid, &local_id, &mut metadata, alive_guids)
                            .await;
                    }
                }
            }
            ReplicaState::ThirdWheel => {
                self.reconcile_thirdwheel(reference_id, &guid, &metadata).await;
            }
            ReplicaState::Invalid => {
                info!(guid = %guid, reference_id, "invalid replica; demoting for removal");
                self.change_state(reference_id, ReplicaState::Deleted, None)
                    .await;
            }
            ReplicaState::Offline => {
                self.change_state(reference_id, ReplicaState::Alive, None)
                    .await;
            }
            _ => {}
        }

        // Replicas already marked deleted (a previous pass, or the delete
        // handler) get their bytes reclaimed now.
        if state == ReplicaState::Deleted {
            self.backend.remove(&local_id).await;
            self.store.set(reference_id, None).await;
            self.stats.lock().replicas_removed += 1;
        }
        Ok(())
    }

    /// Replication arithmetic for an alive, non-duplicate replica.
    async fn reconcile_replication(
        &self,
        reference_id: &str,
        guid: &str,
        local_id: &str,
        metadata: &mut FileMetadata,
        alive_guids: &mut Vec<String>,
    ) {
        let needed = metadata.needed_replicas.unwrap_or(1) as usize;

        // The catalog must list this replica as alive; fix its view locally
        // and re-assert the state so the next report carries it.
        let my_location = LocationKey::new(&self.config.service_id, reference_id);
        if metadata.location_state(&my_location) != Some(ReplicaState::Alive) {
            metadata.record_location(my_location, ReplicaState::Alive);
            self.change_state(reference_id, ReplicaState::Alive, None)
                .await;
        }

        let replicated = metadata.replicated_services();
        if replicated < needed {
            info!(guid, replicated, needed, "file is under-replicated");
            self.request_replication(guid, local_id).await;
            alive_guids.push(guid.to_string());
        } else if replicated > needed {
            info!(guid, replicated, needed, "file is over-replicated");
            // One demotion per excess: stand down if any thirdwheel exists.
            if metadata.count_state(ReplicaState::ThirdWheel) == 0 {
                self.change_state(reference_id, ReplicaState::ThirdWheel, None)
                    .await;
            }
        } else {
            alive_guids.push(guid.to_string());
        }
    }

    /// Offers this copy to the broker and pushes it on acceptance.
    async fn request_replication(&self, guid: &str, local_id: &str) {
        let request = replication_request(guid);
        let response = self
            .bartender()
            .add_replica(&request, &self.config.supported_protocols)
            .await;
        match response {
            Ok(mut slots) => match slots.remove("replicate") {
                Some(slot) if slot.accepted() => {
                    self.stats.lock().replication_requests += 1;
                    if let Err(e) = self
                        .backend
                        .copy_to(local_id, &slot.turl, &slot.protocol)
                        .await
                    {
                        warn!(guid, turl = %slot.turl, error = %e, "replica push failed");
                    }
                }
                Some(slot) => debug!(guid, status = %slot.status, "broker declined replication"),
                None => debug!(guid, "broker answer missing our request tag"),
            },
            Err(e) => debug!(guid, error = %e, "broker unreachable"),
        }
    }

    /// Decides whether a surplus replica may finally go, or is needed again.
    ///
    /// Known heuristic tie-breaks, preserved as documented: a thirdwheel is
    /// safe to delete when this shepherd holds another alive replica of the
    /// GUID, or when no other shepherd holds a thirdwheel and replication is
    /// sufficient without this copy; otherwise it is promoted back to alive.
    async fn reconcile_thirdwheel(
        &self,
        reference_id: &str,
        guid: &str,
        metadata: &FileMetadata,
    ) {
        let needed = metadata.needed_replicas.unwrap_or(1) as usize;
        let alive = metadata.count_state(ReplicaState::Alive);
        let foreign_thirdwheels =
            metadata.count_state_elsewhere(ReplicaState::ThirdWheel, &self.config.service_id);
        let my_alive = metadata.count_state_at(ReplicaState::Alive, &self.config.service_id);

        if my_alive != 0 || (foreign_thirdwheels == 0 && alive >= needed) {
            info!(guid, reference_id, "surplus replica no longer needed");
            self.change_state(reference_id, ReplicaState::Deleted, None)
                .await;
        } else {
            self.change_state(reference_id, ReplicaState::Alive, None)
                .await;
        }
    }

    /// The checking loop: one pass after another until shutdown, sleeping a
    /// full period whenever the store is empty.
    pub(crate) async fn checking_loop(self: Arc<Self>) {
        let mut watcher = self.run.watcher();
        if !watcher.idle(STARTUP_DELAY).await {
            return;
        }
        while watcher.is_running() {
            let visited = self.run_check_pass().await;
            if visited == 0
                && !watcher
                    .idle(Duration::from_millis(self.config.check_period_ms))
                    .await
            {
                return;
            }
        }
    }
}

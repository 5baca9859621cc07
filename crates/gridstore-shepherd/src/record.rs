//! Per-replica metadata records.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use gridstore_catalog::ReplicaState;

/// Everything a shepherd stores about one of its replicas, keyed in the
/// store by the replica's `referenceID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaRecord {
    /// Catalog-wide logical file identity.
    pub guid: String,
    /// Backend-specific physical identifier.
    pub local_id: String,
    /// Current replica state.
    pub state: ReplicaState,
    /// Authoritative checksum recorded at creation or catalog sync.
    /// Empty until known.
    pub checksum: String,
    /// Algorithm of the authoritative checksum.
    pub checksum_type: String,
    /// Last checksum actually computed from the stored bytes.
    pub last_checksum: Option<String>,
    /// When `last_checksum` was computed (epoch seconds).
    pub last_checksum_time: Option<u64>,
    /// File size in bytes, fixed at creation.
    pub size: u64,
    /// Access-control entries, fixed at creation.
    pub acl: Vec<String>,
    /// Creation time (epoch seconds).
    pub created: u64,
}

impl ReplicaRecord {
    /// Whether an authoritative checksum has been recorded yet.
    pub fn checksum_known(&self) -> bool {
        !self.checksum.is_empty()
    }
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

//! Replica lifecycle states.
//!
//! A replica moves through these states as it is uploaded, verified against
//! its checksum, found surplus, or scheduled for removal. The lowercase names
//! are the wire form used in catalog location maps and state reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// State of one physical replica on a storage element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaState {
    /// Valid copy; counts toward the file's replication.
    Alive,
    /// Upload in progress; not yet verified.
    Creating,
    /// Upload abandoned or timed out.
    Stalled,
    /// Checksum mismatch on a previously complete copy.
    Invalid,
    /// Marked for physical removal.
    Deleted,
    /// Valid but surplus beyond the required replica count.
    ThirdWheel,
    /// Backend temporarily unreachable; treated as recoverable.
    Offline,
}

impl ReplicaState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaState::Alive => "alive",
            ReplicaState::Creating => "creating",
            ReplicaState::Stalled => "stalled",
            ReplicaState::Invalid => "invalid",
            ReplicaState::Deleted => "deleted",
            ReplicaState::ThirdWheel => "thirdwheel",
            ReplicaState::Offline => "offline",
        }
    }

    /// Whether a replica in this state counts toward the file's replication
    /// (complete or on its way to complete).
    pub fn counts_toward_replication(&self) -> bool {
        matches!(self, ReplicaState::Alive | ReplicaState::Creating)
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaState {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(ReplicaState::Alive),
            "creating" => Ok(ReplicaState::Creating),
            "stalled" => Ok(ReplicaState::Stalled),
            "invalid" => Ok(ReplicaState::Invalid),
            "deleted" => Ok(ReplicaState::Deleted),
            "thirdwheel" => Ok(ReplicaState::ThirdWheel),
            "offline" => Ok(ReplicaState::Offline),
            other => Err(CatalogError::Protocol {
                msg: format!("unknown replica state {:?}", other),
            }),
        }
    }
}

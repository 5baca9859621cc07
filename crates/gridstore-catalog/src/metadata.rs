// File: crates/gridstore-catalog/src/metadata.rs

//! Typed view of per-file catalog metadata.
//!
//! The catalog answers metadata queries as a sparse mapping keyed by
//! `(section, property)` pairs. [`FileMetadata::from_pairs`] folds one such
//! answer into a typed structure once per response; malformed pairs are
//! dropped so protocol noise degrades to absence rather than failure.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;
use crate::state::ReplicaState;

/// Identifies one replica location in the catalog: which storage element
/// holds it, and under which local reference.
///
/// The wire form is the space-joined pair `"<serviceID> <referenceID>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    /// Identity of the storage element holding the replica.
    pub service_id: String,
    /// The holder's local replica reference.
    pub reference_id: String,
}

impl LocationKey {
    /// Builds a location key.
    pub fn new(service_id: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            reference_id: reference_id.into(),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.service_id, self.reference_id)
    }
}

impl FromStr for LocationKey {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (service_id, reference_id) = s.split_once(' ').ok_or_else(|| CatalogError::Protocol {
            msg: format!("malformed location key {:?}", s),
        })?;
        Ok(Self::new(service_id, reference_id))
    }
}

/// One entry of a shepherd's state report to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Catalog-wide logical file identity.
    pub guid: String,
    /// The reporting shepherd's local replica reference.
    pub reference_id: String,
    /// Replica state at drain time.
    pub state: ReplicaState,
}

/// Catalog metadata for one logical file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetadata {
    /// Catalog entry type; a live file reads `"file"`.
    pub entry_type: Option<String>,
    /// Authoritative checksum value, when the catalog knows one.
    pub checksum: Option<String>,
    /// Algorithm the authoritative checksum was computed with.
    pub checksum_type: Option<String>,
    /// Required replica count; absent means the default of one.
    pub needed_replicas: Option<u32>,
    /// Replica locations known to the catalog and their reported states.
    pub locations: HashMap<LocationKey, ReplicaState>,
}

impl FileMetadata {
    /// Folds a raw `(section, property) -> value` response into a typed
    /// structure. Unknown sections and unparsable values are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = ((String, String), String)>,
    {
        let mut metadata = Self::default();
        for ((section, property), value) in pairs {
            match (section.as_str(), property.as_str()) {
                ("entry", "type") => metadata.entry_type = Some(value),
                ("states", "checksum") => metadata.checksum = Some(value),
                ("states", "checksumType") => metadata.checksum_type = Some(value),
                ("states", "neededReplicas") => metadata.needed_replicas = value.parse().ok(),
                ("locations", key) => {
                    if let (Ok(key), Ok(state)) = (key.parse(), value.parse()) {
                        metadata.locations.insert(key, state);
                    }
                }
                _ => {}
            }
        }
        metadata
    }

    /// Whether the catalog still lists this entry as a file.
    pub fn is_file(&self) -> bool {
        self.entry_type.as_deref() == Some("file")
    }

    /// State the catalog records for a particular location, if any.
    pub fn location_state(&self, key: &LocationKey) -> Option<ReplicaState> {
        self.locations.get(key).copied()
    }

    /// Records (or overwrites) a location's state in this local view.
    pub fn record_location(&mut self, key: LocationKey, state: ReplicaState) {
        self.locations.insert(key, state);
    }

    /// Number of distinct storage elements holding a replica that counts
    /// toward replication (`alive` or `creating`).
    pub fn replicated_services(&self) -> usize {
        self.locations
            .iter()
            .filter(|(_, state)| state.counts_toward_replication())
            .map(|(key, _)| key.service_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of locations, anywhere, in the given state.
    pub fn count_state(&self, state: ReplicaState) -> usize {
        self.locations.values().filter(|s| **s == state).count()
    }

    /// Number of locations in the given state held by `service_id`.
    pub fn count_state_at(&self, state: ReplicaState, service_id: &str) -> usize {
        self.locations
            .iter()
            .filter(|(key, s)| **s == state && key.service_id == service_id)
            .count()
    }

    /// Number of locations in the given state held by any *other* service.
    pub fn count_state_elsewhere(&self, state: ReplicaState, service_id: &str) -> usize {
        self.locations
            .iter()
            .filter(|(key, s)| **s == state && key.service_id != service_id)
            .count()
    }
}

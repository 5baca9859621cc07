#![warn(missing_docs)]

//! Gridstore storage-element replica manager ("shepherd").
//!
//! A shepherd owns the file replicas held on one storage element. It
//! continuously re-derives each replica's state from its checksum, reconciles
//! replication against the catalog, and heals drift: under-replicated files
//! are offered to the replication broker, surplus and corrupt copies are
//! demoted and eventually removed. State changes flow to the catalog through
//! an asynchronous, batched reporting channel that is decoupled from the
//! checking cadence.

pub mod backend;
pub mod changed;
pub mod checking;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod manager;
pub mod record;
pub mod reporting;
pub mod store;

pub use backend::{BackendError, TransferBackend};
pub use config::ShepherdConfig;
pub use error::ShepherdError;
pub use manager::{Shepherd, ShepherdHandle, ShepherdStats, SpaceInfo};
pub use record::ReplicaRecord;
pub use store::{MemoryStore, ReplicaStore};

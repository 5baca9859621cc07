//! Client-facing request handlers.
//!
//! All operations are batch-oriented: the caller supplies a map from its own
//! request-correlation IDs to per-request parameters and gets a same-keyed
//! map of results back. Failures are typed values inside the map, never
//! errors thrown at the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use gridstore_catalog::ReplicaState;

use crate::manager::Shepherd;
use crate::record::{unix_secs, ReplicaRecord};

/// Typed per-request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFault {
    /// The reference ID is not stored here.
    #[error("no such referenceID")]
    NoSuchReference,
    /// None of the offered protocols is supported by the backend.
    #[error("no supported protocol found")]
    NoSupportedProtocol,
    /// The replica exists but is not in the `alive` state.
    #[error("file is not alive")]
    NotAlive,
    /// The backend does not have room for the upload.
    #[error("not enough space")]
    NotEnoughSpace,
    /// An alive replica of this GUID already lives on this storage element.
    #[error("already have this file")]
    AlreadyHaveFile,
    /// Staging or another internal step failed.
    #[error("internal error ({0})")]
    Internal(String),
}

/// Parameters of one download request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    /// Replica to download.
    pub reference_id: String,
    /// Protocols the caller can speak, unordered.
    pub protocols: Vec<String>,
}

/// Staged download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetGranted {
    /// Transfer URL to fetch the bytes from.
    pub turl: String,
    /// Negotiated protocol.
    pub protocol: String,
    /// Authoritative checksum of the replica.
    pub checksum: String,
    /// Algorithm of that checksum.
    pub checksum_type: String,
}

/// Parameters of one upload request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    /// Logical file the new replica belongs to.
    pub guid: String,
    /// Upload size in bytes.
    pub size: u64,
    /// Authoritative checksum, when the caller already knows it.
    pub checksum: String,
    /// Algorithm of that checksum.
    pub checksum_type: String,
    /// Access-control entries for the new replica.
    pub acl: Vec<String>,
    /// Protocols the caller can speak, unordered.
    pub protocols: Vec<String>,
}

/// Staged upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutGranted {
    /// Transfer URL to push the bytes to.
    pub turl: String,
    /// Negotiated protocol.
    pub protocol: String,
    /// Reference ID allocated for the new replica.
    pub reference_id: String,
}

/// Fixed projection of one replica's record; all fields are `None` for an
/// unknown reference ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatReply {
    /// The queried reference ID.
    pub reference_id: String,
    /// Replica state.
    pub state: Option<ReplicaState>,
    /// Algorithm of the authoritative checksum.
    pub checksum_type: Option<String>,
    /// Authoritative checksum.
    pub checksum: Option<String>,
    /// Access-control entries.
    pub acl: Option<Vec<String>>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Logical file identity.
    pub guid: Option<String>,
    /// Backend-specific physical identifier.
    pub local_id: Option<String>,
}

/// Per-request outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The replica is marked deleted; physical removal follows in the
    /// checking loop.
    Deleted,
    /// No replica is stored under the reference ID.
    NoSuchFile,
}

impl Shepherd {
    /// Stages downloads for a batch of alive replicas.
    pub async fn get(
        &self,
        request: HashMap<String, GetRequest>,
    ) -> HashMap<String, Result<GetGranted, RequestFault>> {
        let mut response = HashMap::new();
        for (request_id, get) in request {
            let result = self.get_one(&get).await;
            response.insert(request_id, result);
        }
        response
    }

    async fn get_one(&self, get: &GetRequest) -> Result<GetGranted, RequestFault> {
        let record = self
            .store
            .get(&get.reference_id)
            .await
            .ok_or(RequestFault::NoSuchReference)?;
        if record.state != ReplicaState::Alive {
            return Err(RequestFault::NotAlive);
        }
        let protocol = self
            .backend
            .match_protocols(&get.protocols)
            .into_iter()
            .next()
            .ok_or(RequestFault::NoSupportedProtocol)?;

        match self
            .backend
            .prepare_to_get(&get.reference_id, &record.local_id, &protocol)
            .await
        {
            Ok(Some(turl)) => Ok(GetGranted {
                turl,
                protocol,
                checksum: record.checksum,
                checksum_type: record.checksum_type,
            }),
            Ok(None) => Err(RequestFault::Internal("empty TURL".to_string())),
            Err(e) => Err(RequestFault::Internal(format!("prepareToGet: {e}"))),
        }
    }

    /// Stages uploads for a batch of new replicas.
    pub async fn put(
        &self,
        request: HashMap<String, PutRequest>,
    ) -> HashMap<String, Result<PutGranted, RequestFault>> {
        let mut response = HashMap::new();
        for (request_id, put) in request {
            let result = self.put_one(&put).await;
            response.insert(request_id, result);
        }
        response
    }

    async fn put_one(&self, put: &PutRequest) -> Result<PutGranted, RequestFault> {
        let protocol = self
            .backend
            .match_protocols(&put.protocols)
            .into_iter()
            .next()
            .ok_or(RequestFault::NoSupportedProtocol)?;

        if let Some(available) = self.backend.available_space().await {
            if available < put.size {
                return Err(RequestFault::NotEnoughSpace);
            }
        }

        // Dedup guard: one alive replica per GUID on this storage element.
        for reference_id in self.store.list().await {
            if let Some(record) = self.store.get(&reference_id).await {
                if record.guid == put.guid && record.state == ReplicaState::Alive {
                    return Err(RequestFault::AlreadyHaveFile);
                }
            }
        }

        let reference_id = Uuid::new_v4().to_string();
        let local_id = self.backend.generate_local_id();
        let record = ReplicaRecord {
            guid: put.guid.clone(),
            local_id: local_id.clone(),
            state: ReplicaState::Creating,
            checksum: put.checksum.clone(),
            checksum_type: put.checksum_type.clone(),
            last_checksum: None,
            last_checksum_time: None,
            size: put.size,
            acl: put.acl.clone(),
            created: unix_secs(),
        };

        match self
            .backend
            .prepare_to_put(&reference_id, &local_id, &protocol)
            .await
        {
            Ok(Some(turl)) => {
                debug!(reference_id = %reference_id, guid = %put.guid, "upload staged");
                self.store.set(&reference_id, Some(record)).await;
                self.changed.push(reference_id.clone());
                Ok(PutGranted {
                    turl,
                    protocol,
                    reference_id,
                })
            }
            Ok(None) => Err(RequestFault::Internal("empty TURL".to_string())),
            Err(e) => Err(RequestFault::Internal(format!("prepareToPut: {e}"))),
        }
    }

    /// Projects stored metadata for a batch of reference IDs.
    pub async fn stat(&self, request: HashMap<String, String>) -> HashMap<String, StatReply> {
        let mut response = HashMap::new();
        for (request_id, reference_id) in request {
            let reply = match self.store.get(&reference_id).await {
                Some(record) => StatReply {
                    reference_id,
                    state: Some(record.state),
                    checksum_type: Some(record.checksum_type),
                    checksum: Some(record.checksum),
                    acl: Some(record.acl),
                    size: Some(record.size),
                    guid: Some(record.guid),
                    local_id: Some(record.local_id),
                },
                None => StatReply {
                    reference_id,
                    ..Default::default()
                },
            };
            response.insert(request_id, reply);
        }
        response
    }

    /// Marks a batch of replicas deleted. Physical removal is deferred to
    /// the checking loop.
    pub async fn delete(&self, request: HashMap<String, String>) -> HashMap<String, DeleteOutcome> {
        let mut response = HashMap::new();
        for (request_id, reference_id) in request {
            let outcome = if self
                .change_state(&reference_id, ReplicaState::Deleted, None)
                .await
            {
                DeleteOutcome::Deleted
            } else {
                DeleteOutcome::NoSuchFile
            };
            response.insert(request_id, outcome);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_wire_messages() {
        assert_eq!(
            RequestFault::NoSuchReference.to_string(),
            "no such referenceID"
        );
        assert_eq!(
            RequestFault::NoSupportedProtocol.to_string(),
            "no supported protocol found"
        );
        assert_eq!(RequestFault::NotAlive.to_string(), "file is not alive");
        assert_eq!(RequestFault::NotEnoughSpace.to_string(), "not enough space");
        assert_eq!(
            RequestFault::AlreadyHaveFile.to_string(),
            "already have this file"
        );
        assert_eq!(
            RequestFault::Internal("empty TURL".to_string()).to_string(),
            "internal error (empty TURL)"
        );
    }

    #[test]
    fn test_stat_reply_default_is_all_none() {
        let reply = StatReply {
            reference_id: "ref-1".to_string(),
            ..Default::default()
        };
        assert!(reply.state.is_none());
        assert!(reply.guid.is_none());
        assert!(reply.size.is_none());
    }
}

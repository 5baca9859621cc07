//! Transfer-backend contract.
//!
//! The backend owns the physical bytes: it computes checksums, accounts for
//! space, stages transfer URLs for uploads and downloads, pushes copies to
//! other storage elements, and deletes data. Implementations live outside
//! this crate; the shepherd drives them through this seam and is expected to
//! be told about completed uploads via [`crate::manager::Shepherd::file_arrived`].

use async_trait::async_trait;
use thiserror::Error;

/// A failed transfer-backend call.
#[derive(Debug, Clone, Error)]
#[error("backend error: {msg}")]
pub struct BackendError {
    /// Description of the failure.
    pub msg: String,
}

impl BackendError {
    /// Builds a backend error from any displayable cause.
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Physical data-transfer backend of one storage element.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Free space in bytes, when the backend can tell.
    async fn available_space(&self) -> Option<u64>;

    /// Computes the checksum of the stored bytes under `local_id`.
    async fn checksum(&self, local_id: &str, checksum_type: &str) -> Result<String, BackendError>;

    /// Allocates a fresh backend-specific physical identifier.
    fn generate_local_id(&self) -> String;

    /// Stages a download and returns its transfer URL, or `None` when the
    /// backend cannot stage one right now.
    async fn prepare_to_get(
        &self,
        reference_id: &str,
        local_id: &str,
        protocol: &str,
    ) -> Result<Option<String>, BackendError>;

    /// Stages an upload and returns its transfer URL, or `None` when the
    /// backend cannot stage one right now.
    async fn prepare_to_put(
        &self,
        reference_id: &str,
        local_id: &str,
        protocol: &str,
    ) -> Result<Option<String>, BackendError>;

    /// Pushes the local copy to another storage element's transfer URL.
    async fn copy_to(&self, local_id: &str, turl: &str, protocol: &str)
        -> Result<(), BackendError>;

    /// Physically deletes the bytes under `local_id`.
    async fn remove(&self, local_id: &str) -> bool;

    /// Filters `candidates` down to the protocols this backend supports,
    /// ordered by the backend's preference.
    fn match_protocols(&self, candidates: &[String]) -> Vec<String>;
}

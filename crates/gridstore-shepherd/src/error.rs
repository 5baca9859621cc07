//! Error types for the shepherd.

use thiserror::Error;

use crate::backend::BackendError;
use gridstore_catalog::CatalogError;

/// Errors raised by the replica manager.
///
/// Configuration errors are fatal at startup; everything else is caught at
/// per-replica or per-report granularity and logged by the owning loop.
#[derive(Debug, Error)]
pub enum ShepherdError {
    /// Invalid configuration; the service refuses to start.
    #[error("configuration error: {msg}")]
    Config {
        /// What is wrong with the configuration.
        msg: String,
    },

    /// A catalog, broker, or directory call failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A transfer-backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The catalog answered but did not include the requested GUID.
    #[error("catalog has no metadata for {guid}")]
    MissingMetadata {
        /// The GUID the catalog did not know.
        guid: String,
    },
}

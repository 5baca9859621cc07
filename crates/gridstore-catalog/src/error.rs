//! Error type for catalog-tier interactions.

use thiserror::Error;

/// Errors surfaced by catalog, broker, and directory clients.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// The remote peer could not be reached or did not answer.
    #[error("catalog unavailable: {msg}")]
    Unavailable {
        /// Description of the transport failure.
        msg: String,
    },

    /// The peer answered with something the protocol does not allow.
    #[error("catalog protocol error: {msg}")]
    Protocol {
        /// Description of the malformed answer.
        msg: String,
    },
}

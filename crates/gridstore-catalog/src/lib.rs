#![warn(missing_docs)]

//! Gridstore catalog vocabulary: replica states, the typed catalog metadata
//! model, and the client contracts a shepherd uses to talk to the catalog
//! tier (Librarian), the replication broker (Bartender), and the directory
//! service.

pub mod client;
pub mod error;
pub mod metadata;
pub mod state;

pub use client::{
    BartenderClient, ClientFactory, DirectoryClient, LibrarianClient, ReplicaSlot, ServiceType,
};
pub use error::CatalogError;
pub use metadata::{FileMetadata, LocationKey, ReportEntry};
pub use state::ReplicaState;

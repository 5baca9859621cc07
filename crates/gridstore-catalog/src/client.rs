//! Client contracts for the catalog tier.
//!
//! The wire transport behind these traits is out of scope here; a shepherd
//! only relies on the calls below. All remote calls are fallible and callers
//! bound them by their own loop cadence rather than internal timeouts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CatalogError;
use crate::metadata::{FileMetadata, ReportEntry};

/// Service roles resolvable through the directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// The catalog metadata/reporting service.
    Librarian,
    /// The replication placement broker.
    Bartender,
}

impl ServiceType {
    /// Directory-service name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Librarian => "librarian",
            ServiceType::Bartender => "bartender",
        }
    }
}

/// Broker answer to one tagged replication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSlot {
    /// Broker status word; `"done"` signals acceptance.
    pub status: String,
    /// Transfer URL to push the copy to, when accepted.
    pub turl: String,
    /// Transfer protocol for the push.
    pub protocol: String,
}

impl ReplicaSlot {
    /// Whether the broker accepted the request and staged a slot.
    pub fn accepted(&self) -> bool {
        self.status == "done"
    }
}

/// Catalog (Librarian) client: authoritative per-file metadata and the
/// replica state report endpoint.
#[async_trait]
pub trait LibrarianClient: Send + Sync {
    /// Endpoints this client is currently bound to. Empty means the client
    /// has nowhere to send and discovery should keep looking.
    fn urls(&self) -> Vec<String>;

    /// Fetches metadata for the given GUIDs. GUIDs unknown to the catalog
    /// are absent from the result.
    async fn get(&self, guids: &[String]) -> Result<HashMap<String, FileMetadata>, CatalogError>;

    /// Sends a state report on behalf of `service_id`. The reply is the
    /// number of seconds until the next report is expected; a negative value
    /// asks the shepherd to resend its full state.
    async fn report(
        &self,
        service_id: &str,
        entries: Vec<ReportEntry>,
    ) -> Result<i64, CatalogError>;
}

/// Replication broker (Bartender) client.
#[async_trait]
pub trait BartenderClient: Send + Sync {
    /// Endpoints this client is currently bound to.
    fn urls(&self) -> Vec<String>;

    /// Requests replica slots for the tagged GUIDs, offering the given
    /// transfer protocols. The answer is keyed by the caller's tags.
    async fn add_replica(
        &self,
        requests: &HashMap<String, String>,
        protocols: &[String],
    ) -> Result<HashMap<String, ReplicaSlot>, CatalogError>;
}

/// Directory-service client used to discover catalog endpoints when no
/// static URLs are configured.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolves the registered endpoint URLs for a service role.
    async fn service_urls(&self, service_type: ServiceType) -> Result<Vec<String>, CatalogError>;
}

/// Builds concrete clients from endpoint URLs.
///
/// Configuration selects a factory implementation at startup; the discovery
/// loops use the same factory to swap in clients for freshly resolved URLs.
pub trait ClientFactory: Send + Sync {
    /// Builds a librarian client bound to the given endpoints.
    fn librarian(&self, urls: Vec<String>) -> Arc<dyn LibrarianClient>;
    /// Builds a bartender client bound to the given endpoints.
    fn bartender(&self, urls: Vec<String>) -> Arc<dyn BartenderClient>;
    /// Builds a directory client for one directory endpoint.
    fn directory(&self, url: String) -> Arc<dyn DirectoryClient>;
}

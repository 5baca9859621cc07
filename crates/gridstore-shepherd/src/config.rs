//! Shepherd configuration.

use serde::{Deserialize, Serialize};

use crate::error::ShepherdError;

/// Configuration for one shepherd instance.
///
/// When `librarian_urls` (or `bartender_urls`) is empty and `directory_urls`
/// is not, the corresponding discovery loop resolves endpoints at runtime.
/// With neither configured the shepherd still serves requests but cannot
/// self-heal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShepherdConfig {
    /// Identity this shepherd registers and reports under.
    pub service_id: String,
    /// Target duration of one full checking pass over all replicas, in
    /// milliseconds. The per-replica interval is this divided by the replica
    /// count.
    pub check_period_ms: u64,
    /// Floor for the per-replica checking interval, in milliseconds.
    pub min_check_interval_ms: u64,
    /// Seconds after which an unfinished upload is declared stalled.
    /// 0 disables the timeout.
    pub creating_timeout_secs: u64,
    /// Seconds a cached checksum of an alive replica stays trusted before
    /// it is recomputed.
    pub checksum_lifetime_secs: u64,
    /// Static catalog endpoints. Empty enables librarian discovery.
    pub librarian_urls: Vec<String>,
    /// Static broker endpoints. Empty enables bartender discovery.
    pub bartender_urls: Vec<String>,
    /// Directory-service endpoints used for discovery.
    pub directory_urls: Vec<String>,
    /// Transfer protocols this shepherd offers, in preference order.
    pub supported_protocols: Vec<String>,
}

impl Default for ShepherdConfig {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            check_period_ms: 600_000,
            min_check_interval_ms: 1_000,
            creating_timeout_secs: 0,
            checksum_lifetime_secs: 3_600,
            librarian_urls: Vec::new(),
            bartender_urls: Vec::new(),
            directory_urls: Vec::new(),
            supported_protocols: vec!["byteio".to_string(), "http".to_string()],
        }
    }
}

impl ShepherdConfig {
    /// Validates the configuration. Failures here abort startup.
    pub fn validate(&self) -> Result<(), ShepherdError> {
        if self.service_id.is_empty() {
            return Err(ShepherdError::Config {
                msg: "service_id must not be empty".to_string(),
            });
        }
        if self.check_period_ms == 0 {
            return Err(ShepherdError::Config {
                msg: "check_period_ms must be positive".to_string(),
            });
        }
        Ok(())
    }
}

//! Directory-based discovery of catalog and broker endpoints.
//!
//! Only runs for roles without static URLs. The directory endpoints are
//! polled in order; the first non-empty URL list builds a fresh client
//! through the factory and swaps it in for the rest of the shepherd.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use gridstore_catalog::ServiceType;

use crate::manager::Shepherd;

/// Backoff while a client with endpoints is installed.
const CONNECTED_BACKOFF: Duration = Duration::from_secs(30);
/// Backoff while no endpoints are known yet.
const SEARCHING_BACKOFF: Duration = Duration::from_secs(3);

impl Shepherd {
    /// Whether the given role currently has any endpoints to talk to.
    fn role_has_endpoints(&self, role: ServiceType) -> bool {
        match role {
            ServiceType::Librarian => !self.librarian().urls().is_empty(),
            ServiceType::Bartender => !self.bartender().urls().is_empty(),
        }
    }

    /// Installs a freshly built client for the role.
    fn install_role(&self, role: ServiceType, urls: Vec<String>) {
        match role {
            ServiceType::Librarian => *self.librarian.write() = self.factory.librarian(urls),
            ServiceType::Bartender => *self.bartender.write() = self.factory.bartender(urls),
        }
    }

    /// Discovery loop for one catalog role.
    pub(crate) async fn discovery_loop(self: Arc<Self>, role: ServiceType) {
        let mut watcher = self.run.watcher();
        while watcher.is_running() {
            let backoff = if self.role_has_endpoints(role) {
                CONNECTED_BACKOFF
            } else {
                SEARCHING_BACKOFF
            };
            if !watcher.idle(backoff).await {
                return;
            }

            debug!(role = role.as_str(), "querying directory services");
            for directory_url in &self.config.directory_urls {
                if !watcher.is_running() {
                    return;
                }
                let directory = self.factory.directory(directory_url.clone());
                match directory.service_urls(role).await {
                    Ok(urls) if !urls.is_empty() => {
                        info!(
                            role = role.as_str(),
                            directory = %directory_url,
                            count = urls.len(),
                            "endpoints resolved from directory"
                        );
                        self.install_role(role, urls);
                        break;
                    }
                    Ok(_) => {
                        debug!(role = role.as_str(), directory = %directory_url, "directory knows no endpoints")
                    }
                    Err(e) => {
                        warn!(role = role.as_str(), directory = %directory_url, error = %e, "directory lookup failed")
                    }
                }
            }
        }
    }
}

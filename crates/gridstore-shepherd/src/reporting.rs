// File: crates/gridstore-shepherd/src/reporting.rs

//! Asynchronous state reporting to the catalog.
//!
//! Decoupled from the checking cadence: whatever changed a replica's state
//! appended its reference ID to the changed-set, and this loop drains the set
//! into a batched report. The catalog's reply schedules the next report; a
//! negative reply asks for a full resend, and so does a delivery failure.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use gridstore_catalog::ReportEntry;

use crate::manager::Shepherd;

/// Delay before the first report after startup.
const STARTUP_DELAY: Duration = Duration::from_secs(5);
/// Poll interval of the loop, and floor between two reports.
const REPORT_POLL: Duration = Duration::from_secs(10);
/// Next-report fallback when the catalog gives no hint.
const DEFAULT_NEXT_REPORT_SECS: i64 = 10;

impl Shepherd {
    /// Drains the changed-set, sends one report, and returns the catalog's
    /// next-report hint in seconds.
    ///
    /// Drained IDs are deduplicated; records are re-read at drain time, so a
    /// replica that changed twice is reported once with its latest state.
    /// IDs whose record vanished are logged and skipped. A hint of zero
    /// becomes the 10 s default; a negative hint (or a failed send, which is
    /// treated as one) requeues the entire store listing.
    pub async fn run_report_cycle(&self) -> i64 {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for reference_id in self.changed.drain() {
            if !seen.insert(reference_id.clone()) {
                continue;
            }
            match self.store.get(&reference_id).await {
                Some(record) => entries.push(ReportEntry {
                    guid: record.guid,
                    reference_id,
                    state: record.state,
                }),
                None => {
                    debug!(reference_id = %reference_id, "changed replica vanished before reporting");
                }
            }
        }

        let count = entries.len();
        let mut next_report = match self
            .librarian()
            .report(&self.config.service_id, entries)
            .await
        {
            Ok(hint) => {
                debug!(count, hint, "state report delivered");
                self.stats.lock().reports_sent += 1;
                hint
            }
            Err(e) => {
                debug!(error = %e, "state report failed; will resend everything");
                -1
            }
        };

        if next_report == 0 {
            next_report = DEFAULT_NEXT_REPORT_SECS;
        }
        if next_report < 0 {
            info!("resending full replica state to the catalog");
            self.changed.extend(self.store.list().await);
            self.stats.lock().full_resyncs += 1;
        }
        next_report
    }

    /// The reporting loop: report, then wait until either new changes arrive
    /// or half the hint interval elapses, so reports are both timely and a
    /// periodic heartbeat. While reporting is toggled off the loop only
    /// sleeps and re-polls the flag.
    pub(crate) async fn reporting_loop(self: Arc<Self>) {
        let mut watcher = self.run.watcher();
        if !watcher.idle(STARTUP_DELAY).await {
            return;
        }
        while watcher.is_running() {
            if !self.do_reporting.load(Ordering::Relaxed) {
                if !watcher.idle(REPORT_POLL).await {
                    return;
                }
                continue;
            }

            let next_report = self.run_report_cycle().await;
            let half_hint = Duration::from_secs(next_report.max(0) as u64 / 2);

            if !watcher.idle(REPORT_POLL).await {
                return;
            }
            if half_hint > REPORT_POLL {
                tokio::select! {
                    _ = self.changed.wait_nonempty(half_hint - REPORT_POLL) => {}
                    _ = watcher.stopped() => return,
                }
            }
        }
    }
}

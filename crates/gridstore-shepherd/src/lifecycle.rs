//! Run-state signalling for the background loops.
//!
//! Every loop polls the run flag at each cycle boundary, and sleeps through
//! [`RunWatcher::idle`] so a shutdown wakes them instead of waiting out the
//! interval.

use std::time::Duration;
use tokio::sync::watch;

/// Owner side of the run flag.
pub struct RunState {
    tx: watch::Sender<bool>,
}

impl RunState {
    /// Creates a run state in the running position.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx }
    }

    /// Whether the service is still running.
    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flips the flag to stopped and wakes every watcher.
    pub fn stop(&self) {
        self.tx.send_replace(false);
    }

    /// A watcher handle for one loop.
    pub fn watcher(&self) -> RunWatcher {
        RunWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop-side view of the run flag.
pub struct RunWatcher {
    rx: watch::Receiver<bool>,
}

impl RunWatcher {
    /// Whether the service is still running.
    pub fn is_running(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the service stops.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|running| !*running).await;
    }

    /// Sleeps for `duration`, waking early on shutdown. Returns whether the
    /// service is still running afterwards.
    pub async fn idle(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.stopped() => {}
        }
        self.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_running() {
        let run = RunState::new();
        assert!(run.is_running());
        assert!(run.watcher().is_running());
    }

    #[tokio::test]
    async fn test_stop_is_observed() {
        let run = RunState::new();
        let watcher = run.watcher();
        run.stop();
        assert!(!run.is_running());
        assert!(!watcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_runs_out_the_clock_while_running() {
        let run = RunState::new();
        let mut watcher = run.watcher();
        assert!(watcher.idle(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_stop_wakes_idle_sleep() {
        let run = RunState::new();
        let mut watcher = run.watcher();
        let sleeper = tokio::spawn(async move { watcher.idle(Duration::from_secs(600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        run.stop();
        assert!(!sleeper.await.unwrap());
    }
}

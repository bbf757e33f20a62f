//! Hot reload of the watched-kinds document (component C3).
//!
//! Polls the document at a configurable interval and re-reads it whenever
//! its on-disk fingerprint changes. The diff against the running watch set
//! is applied as starts before stops, so no mutation stream gap opens
//! during a transition. The process is never restarted; log, graph, and
//! indexer state are untouched.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;

use crate::kinds::{KindSpec, WatchedKinds};
use crate::manager::WatchManager;

/// Default document poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Watches the config document and reconciles the watch set.
pub struct ConfigReloader {
    path: PathBuf,
    poll_interval: Duration,
    fingerprint: Option<blake3::Hash>,
}

impl ConfigReloader {
    pub fn new(path: PathBuf, poll_interval: Duration) -> Self {
        Self {
            path,
            poll_interval,
            fingerprint: None,
        }
    }

    /// Runs until `shutdown` flips. Applies the initial configuration
    /// immediately, then reconciles on every observed change.
    pub async fn run(mut self, manager: &mut WatchManager, mut shutdown: watch::Receiver<bool>) {
        self.reconcile(manager).await;
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {
                    self.reconcile(manager).await;
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// One reconcile pass: re-read the document if its fingerprint moved,
    /// then start/stop watches to match.
    pub async fn reconcile(&mut self, manager: &mut WatchManager) {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "cannot read watch config; keeping current configuration"
                );
                return;
            }
        };

        let fingerprint = blake3::hash(&bytes);
        if self.fingerprint == Some(fingerprint) {
            return;
        }

        let parsed = match WatchedKinds::parse(&bytes) {
            Ok(parsed) => parsed,
            Err(reason) => {
                tracing::error!(
                    path = %self.path.display(),
                    reason,
                    "watch config is invalid; previous configuration continues to apply"
                );
                // Remember the bad fingerprint so the error logs once per
                // edit, not once per poll.
                self.fingerprint = Some(fingerprint);
                return;
            }
        };
        self.fingerprint = Some(fingerprint);

        let desired = parsed.desired();
        let running: BTreeSet<KindSpec> = manager.running().into_values().collect();

        let to_start: Vec<KindSpec> = desired.difference(&running).cloned().collect();
        let to_stop: Vec<KindSpec> = running.difference(&desired).cloned().collect();
        if to_start.is_empty() && to_stop.is_empty() {
            return;
        }

        tracing::info!(
            starting = to_start.len(),
            stopping = to_stop.len(),
            "applying watch configuration change"
        );

        // Starts before stops: no observation gap across the transition.
        for spec in to_start {
            if let Err(e) = manager.start(spec.clone()) {
                tracing::error!(kind = %spec, error = %e, "failed to start watch");
            }
        }
        for spec in to_stop {
            if let Err(e) = manager.stop(&spec.gvk()).await {
                tracing::error!(kind = %spec, error = %e, "failed to stop watch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_changes_with_content() {
        let a = blake3::hash(b"resources: []");
        let b = blake3::hash(b"resources:\n  - {version: v1, kind: Pod}");
        assert_ne!(a, b);
    }
}

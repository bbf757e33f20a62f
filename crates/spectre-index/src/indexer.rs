//! The single-writer indexing loop.
//!
//! A dedicated OS thread consumes the watcher's bounded channel and, per
//! event: derives the stable id, appends to the log, upserts the resource
//! identity and change event, runs the extractor pipeline, and advances the
//! watermark. Receiving from the bounded channel is the acknowledgement
//! that lets the watcher's buffer drain.
//!
//! # Ordering
//!
//! Everything is applied by this one thread, in arrival order. A reader
//! that observes the watermark at `T` sees every effect of every event with
//! timestamp `<= T`. Readers racing steps 1–4 of an in-flight event may see
//! partial effects of that event only.
//!
//! # Crash recovery
//!
//! On startup the log watermark (max timestamp in the segments) is compared
//! with the graph watermark (max change-event timestamp, restored from the
//! snapshot). Events in `(graph, log]` are replayed from the log through
//! the graph steps; the log itself is never rewritten by recovery.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use spectre_extract::ExtractorRegistry;
use spectre_graph::GraphStore;
use spectre_log::{ImportReport, LogError, LogResult, ScanFilter, SharedEventLog, lock_log};
use spectre_types::{Event, ObservedMutation};
use tokio::sync::{mpsc, oneshot};

use crate::id::derive_event_id;
use crate::metrics::IndexMetrics;
use crate::status::{HealthState, Watermark};

/// Indexer tuning knobs.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Graph snapshot cadence, in indexed events.
    pub snapshot_every: usize,
    /// First retry delay for transient append failures.
    pub retry_base: Duration,
    /// Retry delay ceiling.
    pub retry_cap: Duration,
    /// Total time spent retrying one append before parking the event.
    pub retry_budget: Duration,
    /// Maximum parked events kept for later re-append.
    pub parked_cap: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 5_000,
            retry_base: Duration::from_millis(50),
            retry_cap: Duration::from_secs(5),
            retry_budget: Duration::from_secs(30),
            parked_cap: 1_024,
        }
    }
}

/// Work items for the indexing thread.
///
/// Mutations come from the watcher; imports come from the query surface.
/// Routing imports through the same thread keeps the single-writer
/// discipline: log and graph reflect an import atomically with respect to
/// live ingestion.
#[derive(Debug)]
pub enum IndexCommand {
    Mutation(ObservedMutation),
    Import {
        data: Bytes,
        content_type: Option<String>,
        validate: bool,
        overwrite: bool,
        reply: oneshot::Sender<LogResult<ImportReport>>,
    },
    /// Replaces the extractor pipeline. Takes effect for the next event;
    /// the swap is a plain assignment on the indexing thread, so no event
    /// ever sees a half-replaced registry.
    SwapRegistry(ExtractorRegistry),
}

/// The indexer (component C6). Sole writer to the log and the graph.
pub struct Indexer {
    log: SharedEventLog,
    graph: Arc<GraphStore>,
    registry: ExtractorRegistry,
    config: IndexerConfig,
    watermark: Arc<Watermark>,
    health: Arc<HealthState>,
    metrics: IndexMetrics,
    data_dir: PathBuf,
    parked: VecDeque<Event>,
    since_snapshot: usize,
}

impl Indexer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log: SharedEventLog,
        graph: Arc<GraphStore>,
        registry: ExtractorRegistry,
        config: IndexerConfig,
        watermark: Arc<Watermark>,
        health: Arc<HealthState>,
        metrics: IndexMetrics,
        data_dir: PathBuf,
    ) -> Self {
        watermark.advance(lock_log(&log).max_timestamp());
        Self {
            log,
            graph,
            registry,
            config,
            watermark,
            health,
            metrics,
            data_dir,
            parked: VecDeque::new(),
            since_snapshot: 0,
        }
    }

    /// Replays events the graph has not seen yet: `(graph_wm, log_wm]`.
    ///
    /// Returns the number of replayed events. Call once, before consuming
    /// live events.
    pub fn recover(&mut self) -> LogResult<u64> {
        let graph_wm = self.graph.graph_watermark();
        let log_wm = lock_log(&self.log).max_timestamp();
        if log_wm <= graph_wm {
            return Ok(0);
        }

        tracing::info!(
            graph_watermark = %graph_wm,
            log_watermark = %log_wm,
            "replaying log into graph"
        );

        let mut replayed = 0u64;
        let events: Vec<Event> = lock_log(&self.log)
            .scan(graph_wm + 1, log_wm, ScanFilter::default())
            .collect::<Result<_, _>>()?;
        for event in events {
            self.apply_to_graph(&event);
            replayed += 1;
        }

        self.watermark.advance(log_wm);
        tracing::info!(replayed, "recovery replay complete");
        Ok(replayed)
    }

    /// Consumes the command channel until it closes, then flushes and
    /// snapshots. This is the thread's entire life.
    pub fn run(mut self, mut rx: mpsc::Receiver<IndexCommand>) {
        while let Some(command) = rx.blocking_recv() {
            self.retry_parked();
            match command {
                IndexCommand::Mutation(mutation) => self.process(mutation),
                IndexCommand::Import {
                    data,
                    content_type,
                    validate,
                    overwrite,
                    reply,
                } => {
                    let result =
                        self.process_import(&data, content_type.as_deref(), validate, overwrite);
                    let _ = reply.send(result);
                }
                IndexCommand::SwapRegistry(registry) => {
                    tracing::info!(
                        extractors = registry.extractors().len(),
                        "swapped extractor registry"
                    );
                    self.registry = registry;
                }
            }
        }

        tracing::info!("mutation stream closed, flushing indexer state");
        if let Err(e) = lock_log(&self.log).flush() {
            tracing::error!(error = %e, "final log flush failed");
        }
        if let Err(e) = spectre_graph::snapshot::save(&self.graph, &self.data_dir) {
            tracing::error!(error = %e, "final graph snapshot failed");
        }
    }

    /// Spawns the indexing thread.
    pub fn spawn(self, rx: mpsc::Receiver<IndexCommand>) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("spectre-indexer".to_string())
            .spawn(move || self.run(rx))
            .expect("spawning the indexer thread cannot fail")
    }

    /// Steps 1–6 for one observed mutation.
    fn process(&mut self, mutation: ObservedMutation) {
        let id = derive_event_id(
            &mutation.resource.uid,
            &mutation.resource_version,
            mutation.event_type,
        );
        let event = Event {
            id,
            timestamp: mutation.timestamp,
            event_type: mutation.event_type,
            resource: mutation.resource,
            data: mutation.data,
        };

        match self.append_with_retry(&event) {
            Ok(true) => {}
            Ok(false) => {
                // Same id already inside the open hour: a duplicate
                // delivery, discarded whole.
                tracing::trace!(event_id = %event.id, "discarding duplicate event");
                return;
            }
            Err(e) => {
                self.park(event, &e);
                return;
            }
        }

        self.apply_to_graph(&event);
        self.watermark.advance(event.timestamp);
        self.metrics.events_indexed.inc();
        self.metrics
            .watermark_nanos
            .set(self.watermark.get().as_nanos());

        self.since_snapshot += 1;
        if self.since_snapshot >= self.config.snapshot_every {
            self.since_snapshot = 0;
            if let Err(e) = spectre_graph::snapshot::save(&self.graph, &self.data_dir) {
                tracing::warn!(error = %e, "periodic graph snapshot failed");
            }
        }
    }

    /// Runs an import on the caller's thread. For startup bulk imports,
    /// before the indexing thread exists; runtime imports go through
    /// [`IndexCommand::Import`] instead.
    pub fn import(
        &mut self,
        data: &Bytes,
        content_type: Option<&str>,
        validate: bool,
        overwrite: bool,
    ) -> LogResult<ImportReport> {
        self.process_import(data, content_type, validate, overwrite)
    }

    /// Imports a bare event list (raw segment files at startup).
    pub fn import_events(
        &mut self,
        events: Vec<Event>,
        validate: bool,
        overwrite: bool,
    ) -> LogResult<ImportReport> {
        let outcome = spectre_log::import_events_outcome(
            &mut lock_log(&self.log),
            events,
            validate,
            overwrite,
        )?;
        Ok(self.apply_import_outcome(outcome))
    }

    /// Applies an import: log merge plus graph mirror of every event that
    /// landed, then a snapshot so the work survives a crash.
    fn process_import(
        &mut self,
        data: &Bytes,
        content_type: Option<&str>,
        validate: bool,
        overwrite: bool,
    ) -> LogResult<ImportReport> {
        let outcome = spectre_log::import_outcome(
            &mut lock_log(&self.log),
            data,
            content_type,
            validate,
            overwrite,
        )?;
        Ok(self.apply_import_outcome(outcome))
    }

    fn apply_import_outcome(&mut self, outcome: spectre_log::ImportOutcome) -> ImportReport {
        for event in &outcome.applied {
            self.apply_to_graph(event);
            self.watermark.advance(event.timestamp);
        }
        if !outcome.applied.is_empty() {
            if let Err(e) = spectre_graph::snapshot::save(&self.graph, &self.data_dir) {
                tracing::warn!(error = %e, "post-import graph snapshot failed");
            }
        }
        outcome.report
    }

    /// Steps 3–5: identity, change event, extracted edges.
    fn apply_to_graph(&self, event: &Event) {
        self.graph.upsert_resource_identity(event);
        self.graph.record_change_event(event);
        for edge in self.registry.run(event, self.graph.as_ref()) {
            self.graph.upsert_edge(edge, event.timestamp);
        }
    }

    /// Bounded exponential backoff around `EventLog::append`.
    fn append_with_retry(&mut self, event: &Event) -> LogResult<bool> {
        let started = Instant::now();
        let mut delay = self.config.retry_base;

        loop {
            // The lock is held per attempt, never across a backoff sleep.
            match lock_log(&self.log).append(event) {
                Ok(accepted) => return Ok(accepted),
                Err(e) if e.is_transient() && started.elapsed() < self.config.retry_budget => {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "transient append failure, retrying"
                    );
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(self.config.retry_cap);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Parks an event that could not be made durable and raises the health
    /// flag. The oldest parked event is dropped once the buffer is full.
    fn park(&mut self, event: Event, error: &LogError) {
        tracing::error!(
            event_id = %event.id,
            error = %error,
            parked = self.parked.len() + 1,
            "parking event after persistent append failure"
        );
        if self.parked.len() >= self.config.parked_cap {
            if let Some(dropped) = self.parked.pop_front() {
                tracing::error!(event_id = %dropped.id, "parked buffer full, dropping oldest");
            }
        }
        self.parked.push_back(event);
        self.health.set_parked(self.parked.len());
        self.metrics.events_parked.set(self.parked.len() as i64);
    }

    /// Attempts to drain parked events (storage may have recovered).
    fn retry_parked(&mut self) {
        if self.parked.is_empty() {
            return;
        }
        while let Some(event) = self.parked.pop_front() {
            match lock_log(&self.log).append(&event) {
                Ok(accepted) => {
                    if accepted {
                        self.apply_to_graph(&event);
                        self.watermark.advance(event.timestamp);
                        self.metrics.events_indexed.inc();
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "storage still degraded, keeping events parked");
                    self.parked.push_front(event);
                    break;
                }
            }
        }
        self.health.set_parked(self.parked.len());
        self.metrics.events_parked.set(self.parked.len() as i64);
        if self.parked.is_empty() {
            tracing::info!("parked events drained, log healthy again");
        }
    }

    /// Watermark handle for readers.
    pub fn watermark(&self) -> Arc<Watermark> {
        Arc::clone(&self.watermark)
    }
}

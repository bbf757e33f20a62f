//! Dynamic per-kind watches over the Kubernetes API.
//!
//! One lightweight task per active kind, each with its own bounded buffer,
//! plus one multiplexing task merging the per-kind buffers into the single
//! combined stream `events()` hands out. The per-kind buffer is the
//! back-pressure boundary: when it fills, that kind's watch task parks on
//! `send` (pausing its watch stream pull) and resumes on drain — a noisy
//! kind never stalls the others' ingestion. Pause counts and cumulative
//! pause time are exported per kind.
//!
//! # Reconnect semantics
//!
//! `kube`'s watcher drives the resume-token protocol: on stream close it
//! resumes from the last seen resource version, and when the token has
//! expired it performs a full list, surfaced as `Init`/`InitApply`/
//! `InitDone`. The per-kind task turns a relist into synthetic events
//! against its `uid -> resourceVersion` map: CREATE for unseen uids, UPDATE
//! for changed resource versions, nothing for unchanged objects. Delivery
//! is therefore at-least-once per uid lineage; duplicates are deduplicated
//! downstream by the stable event id.
//!
//! # Stop semantics
//!
//! `stop(kind)` terminates the kind's watch task; whatever its buffer still
//! holds keeps flowing through the multiplexer into the combined stream,
//! and only once the buffer is empty does its channel close and leave the
//! multiplex set.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::SelectAll;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::{WatchStreamExt, watcher};
use kube::Client;
use spectre_types::{
    ClockSource, EventType, GroupVersionKind, ObservedMutation, ResourceMetadata, Uid,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::metrics::WatchMetrics;
use crate::{KindSpec, WatchError, WatchResult};

/// Delay between discovery retries when a kind is not yet served.
const DISCOVERY_RETRY: Duration = Duration::from_secs(10);

struct ActiveWatch {
    spec: KindSpec,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A per-kind buffer's receiving half, as a stream the multiplexer can
/// merge. Ends (and leaves the merge set) once the watch task is gone and
/// the buffer has drained.
struct KindStream {
    rx: mpsc::Receiver<ObservedMutation>,
}

impl futures::Stream for KindStream {
    type Item = ObservedMutation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Manages the dynamic set of kind watches (component C2).
///
/// Construction spawns the multiplexing task, so a `WatchManager` must be
/// created inside a tokio runtime.
pub struct WatchManager {
    client: Client,
    clock: Arc<ClockSource>,
    metrics: WatchMetrics,
    /// Per-kind buffer capacity, in mutations.
    buffer: usize,
    /// Registers a new kind's buffer with the multiplexing task.
    register_tx: mpsc::UnboundedSender<KindStream>,
    rx: Option<mpsc::Receiver<ObservedMutation>>,
    active: HashMap<GroupVersionKind, ActiveWatch>,
}

impl WatchManager {
    /// Creates a manager whose kinds each get a bounded buffer of `buffer`
    /// mutations.
    pub fn new(
        client: Client,
        buffer: usize,
        clock: Arc<ClockSource>,
        metrics: WatchMetrics,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        tokio::spawn(multiplex(register_rx, out_tx));

        Self {
            client,
            clock,
            metrics,
            buffer,
            register_tx,
            rx: Some(out_rx),
            active: HashMap::new(),
        }
    }

    /// Takes the combined mutation stream. Can be taken once.
    pub fn events(&mut self) -> WatchResult<mpsc::Receiver<ObservedMutation>> {
        self.rx.take().ok_or(WatchError::StreamTaken)
    }

    /// The currently running kind specs.
    pub fn running(&self) -> BTreeMap<GroupVersionKind, KindSpec> {
        self.active
            .iter()
            .map(|(gvk, w)| (gvk.clone(), w.spec.clone()))
            .collect()
    }

    /// Starts a watch for a kind.
    pub fn start(&mut self, spec: KindSpec) -> WatchResult<()> {
        let gvk = spec.gvk();
        if self.active.contains_key(&gvk) {
            return Err(WatchError::AlreadyWatching {
                kind: gvk.to_string(),
            });
        }

        let (kind_tx, kind_rx) = mpsc::channel(self.buffer);
        if self.register_tx.send(KindStream { rx: kind_rx }).is_err() {
            // The multiplexer only ends once the combined stream is gone.
            return Err(WatchError::StreamClosed);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = WatchTask {
            client: self.client.clone(),
            spec: spec.clone(),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
            tx: kind_tx,
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(task.run());

        self.metrics.active_watches.inc();
        tracing::info!(kind = %gvk, "started watch");
        self.active.insert(
            gvk,
            ActiveWatch {
                spec,
                shutdown: shutdown_tx,
                handle,
            },
        );
        Ok(())
    }

    /// Stops the watch for a kind. The kind's buffered events keep draining
    /// into the combined stream; its buffer closes once empty.
    pub async fn stop(&mut self, gvk: &GroupVersionKind) -> WatchResult<()> {
        let Some(active) = self.active.remove(gvk) else {
            return Err(WatchError::NotWatching {
                kind: gvk.to_string(),
            });
        };
        let _ = active.shutdown.send(true);
        if active.handle.await.is_err() {
            tracing::warn!(kind = %gvk, "watch task panicked during stop");
        }
        self.metrics.active_watches.dec();
        tracing::info!(kind = %gvk, "stopped watch");
        Ok(())
    }

    /// Stops every watch (process shutdown).
    pub async fn shutdown(&mut self) {
        let gvks: Vec<GroupVersionKind> = self.active.keys().cloned().collect();
        for gvk in gvks {
            let _ = self.stop(&gvk).await;
        }
    }
}

/// The multiplexing task: merges every per-kind buffer into the combined
/// stream, in per-kind arrival order. Runs until the manager is dropped and
/// every buffer has drained, so stopped kinds never lose buffered events.
async fn multiplex(
    mut register_rx: mpsc::UnboundedReceiver<KindStream>,
    out: mpsc::Sender<ObservedMutation>,
) {
    let mut streams: SelectAll<KindStream> = SelectAll::new();
    loop {
        tokio::select! {
            registered = register_rx.recv() => match registered {
                Some(stream) => streams.push(stream),
                None => break,
            },
            Some(mutation) = streams.next(), if !streams.is_empty() => {
                if out.send(mutation).await.is_err() {
                    return;
                }
            }
        }
    }
    // Manager dropped: drain what the buffers still hold, then close the
    // combined stream.
    while let Some(mutation) = streams.next().await {
        if out.send(mutation).await.is_err() {
            return;
        }
    }
}

/// One kind's long-lived watch.
struct WatchTask {
    client: Client,
    spec: KindSpec,
    clock: Arc<ClockSource>,
    metrics: WatchMetrics,
    tx: mpsc::Sender<ObservedMutation>,
    shutdown: watch::Receiver<bool>,
}

impl WatchTask {
    async fn run(mut self) {
        let gvk = self.spec.gvk();
        let kube_gvk = kube::api::GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);

        // Resolve the served resource. Kinds named in the config before
        // their CRD exists retry until discovery succeeds or the watch is
        // stopped.
        let api_resource = loop {
            match kube::discovery::pinned_kind(&self.client, &kube_gvk).await {
                Ok((ar, _caps)) => break ar,
                Err(e) => {
                    tracing::warn!(kind = %gvk, error = %e, "discovery failed, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(DISCOVERY_RETRY) => {}
                        _ = self.shutdown.changed() => return,
                    }
                }
            }
        };

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource);
        let mut config = watcher::Config::default();
        if let Some(fields) = &self.spec.field_selector {
            config = config.fields(fields);
        }

        let stream = watcher(api, config).default_backoff();
        futures::pin_mut!(stream);

        // uid -> last seen resourceVersion, for relist synthesis.
        let mut known: HashMap<Uid, String> = HashMap::new();
        let mut relisting = false;

        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                _ = self.shutdown.changed() => break,
            };
            let Some(item) = item else { break };

            match item {
                Ok(watcher::Event::Init) => {
                    relisting = true;
                    self.metrics
                        .relists
                        .with_label_values(&[gvk.kind.as_str()])
                        .inc();
                    tracing::debug!(kind = %gvk, "relist started");
                }
                Ok(watcher::Event::InitApply(obj)) => {
                    // Synthetic CREATE for unseen uids, UPDATE for changed
                    // resource versions, silence for unchanged objects.
                    let Some((uid, rv)) = identity_of(&obj) else {
                        continue;
                    };
                    match known.get(&uid) {
                        None => {
                            known.insert(uid, rv);
                            self.emit(&gvk, EventType::Create, &obj).await;
                        }
                        Some(prev) if *prev != rv => {
                            known.insert(uid, rv);
                            self.emit(&gvk, EventType::Update, &obj).await;
                        }
                        Some(_) => {}
                    }
                }
                Ok(watcher::Event::InitDone) => {
                    relisting = false;
                    tracing::debug!(kind = %gvk, objects = known.len(), "relist complete");
                }
                Ok(watcher::Event::Apply(obj)) => {
                    let Some((uid, rv)) = identity_of(&obj) else {
                        continue;
                    };
                    let event_type = if known.contains_key(&uid) {
                        EventType::Update
                    } else {
                        EventType::Create
                    };
                    known.insert(uid, rv);
                    self.emit(&gvk, event_type, &obj).await;
                }
                Ok(watcher::Event::Delete(obj)) => {
                    if let Some((uid, _)) = identity_of(&obj) {
                        known.remove(&uid);
                    }
                    self.emit(&gvk, EventType::Delete, &obj).await;
                }
                Err(e) => {
                    tracing::warn!(kind = %gvk, error = %e, relisting, "watch error");
                }
            }
        }
    }

    /// Sends one mutation into this kind's buffer, applying back-pressure
    /// when it is full.
    async fn emit(&self, gvk: &GroupVersionKind, event_type: EventType, obj: &DynamicObject) {
        let Some(mutation) = self.to_mutation(gvk, event_type, obj) else {
            return;
        };
        self.metrics
            .events_observed
            .with_label_values(&[gvk.kind.as_str()])
            .inc();

        match self.tx.try_send(mutation) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(mutation)) => {
                // Buffer full: pause this kind's watch until the multiplexer
                // drains it. Other kinds are unaffected.
                self.metrics
                    .buffer_pauses
                    .with_label_values(&[gvk.kind.as_str()])
                    .inc();
                let paused_at = Instant::now();
                if self.tx.send(mutation).await.is_err() {
                    return;
                }
                self.metrics
                    .buffer_pause_nanos
                    .with_label_values(&[gvk.kind.as_str()])
                    .inc_by(paused_at.elapsed().as_nanos() as u64);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn to_mutation(
        &self,
        gvk: &GroupVersionKind,
        event_type: EventType,
        obj: &DynamicObject,
    ) -> Option<ObservedMutation> {
        let uid = obj.metadata.uid.clone()?;
        let name = obj.metadata.name.clone()?;
        let resource_version = obj.metadata.resource_version.clone().unwrap_or_default();
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();

        // For core Event objects, keep the link to the object the event is
        // about.
        let involved_object_uid = if gvk.kind == "Event" {
            obj.data
                .pointer("/involvedObject/uid")
                .and_then(serde_json::Value::as_str)
                .map(Uid::new)
        } else {
            None
        };

        let data = match serde_json::to_vec(obj) {
            Ok(bytes) => bytes::Bytes::from(bytes),
            Err(e) => {
                tracing::warn!(kind = %gvk, name, error = %e, "dropping unserializable object");
                return None;
            }
        };

        Some(ObservedMutation {
            timestamp: self.clock.now(),
            event_type,
            resource: ResourceMetadata {
                gvk: gvk.clone(),
                namespace,
                name,
                uid: Uid::new(uid),
                involved_object_uid,
            },
            resource_version,
            data,
        })
    }
}

fn identity_of(obj: &DynamicObject) -> Option<(Uid, String)> {
    let uid = obj.metadata.uid.clone()?;
    let rv = obj.metadata.resource_version.clone().unwrap_or_default();
    Some((Uid::new(uid), rv))
}

//! Component wiring and lifecycle.
//!
//! Startup order: log open and tail recovery, graph snapshot restore,
//! optional bulk import, recovery replay, indexer thread, watcher plus
//! config reloader. Shutdown reverses it: stop watches, drain, join the
//! indexer (which flushes and snapshots), release the lock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use spectre_extract::ExtractorRegistry;
use spectre_graph::{GraphStore, NodeKind};
use spectre_index::{
    HealthState, IndexCommand, IndexMetrics, Indexer, IndexerConfig, Watermark,
};
use spectre_log::EventLog;
use spectre_query::QueryService;
use spectre_types::{ClockSource, NANOS_PER_HOUR};
use spectre_watch::{ConfigReloader, WatchManager, WatchMetrics};
use tokio::sync::{mpsc, watch};

use crate::ServerArgs;
use crate::import::import_path;

pub async fn run(args: ServerArgs) -> Result<()> {
    let registry = prometheus::Registry::new();

    // Storage: the log recovers its tail, the graph restores its snapshot.
    let log = EventLog::open(&args.data_dir)
        .with_context(|| format!("opening event log in {}", args.data_dir.display()))?;
    let log = Arc::new(Mutex::new(log));

    let graph = Arc::new(GraphStore::new());
    spectre_graph::snapshot::load(&graph, &args.data_dir).context("loading graph snapshot")?;

    let watermark = Arc::new(Watermark::new());
    let health = Arc::new(HealthState::new());
    let index_metrics = IndexMetrics::register(&registry);

    let mut indexer = Indexer::new(
        Arc::clone(&log),
        Arc::clone(&graph),
        ExtractorRegistry::standard(),
        IndexerConfig::default(),
        Arc::clone(&watermark),
        Arc::clone(&health),
        index_metrics,
        args.data_dir.clone(),
    );

    // Bulk import before anything consumes the stores.
    if let Some(import) = &args.import {
        import_path(&mut indexer, import).context("startup import")?;
    }

    // Close the gap between log and graph from the previous run.
    indexer
        .recover()
        .context("recovery replay from the event log")?;

    let (command_tx, command_rx) = mpsc::channel::<IndexCommand>(args.buffer);
    let indexer_handle = indexer.spawn(command_rx);

    let query = QueryService::new(
        Arc::clone(&log),
        Arc::clone(&graph),
        Arc::clone(&watermark),
        command_tx.clone(),
    );
    startup_summary(&query);

    // Watches only when a config document was given; import-only runs are
    // legitimate (restore, offline analysis).
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watch_handle = if let Some(config_path) = args.config.clone() {
        let client = kube::Client::try_default()
            .await
            .context("connecting to the Kubernetes API")?;
        let clock = Arc::new(ClockSource::new());
        let watch_metrics = WatchMetrics::register(&registry);
        let mut manager = WatchManager::new(client, args.buffer, clock, watch_metrics);
        let mutation_rx = manager
            .events()
            .map_err(|e| anyhow::anyhow!("taking the event stream: {e}"))?;

        // Forward mutations into the indexer's command channel. The bounded
        // channels chain the back-pressure all the way to the watch tasks.
        let forward_tx = command_tx.clone();
        let forwarder = tokio::spawn(async move {
            let mut rx = mutation_rx;
            while let Some(mutation) = rx.recv().await {
                if forward_tx
                    .send(IndexCommand::Mutation(mutation))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let reloader = ConfigReloader::new(
            config_path,
            Duration::from_secs(args.poll_interval.max(1)),
        );
        let reloader_shutdown = shutdown_rx.clone();
        let reloader_handle = tokio::spawn(async move {
            reloader.run(&mut manager, reloader_shutdown).await;
            manager.shutdown().await;
        });
        Some((forwarder, reloader_handle))
    } else {
        tracing::warn!("no --config given; running without watches");
        None
    };

    // Retention sweep, when enabled.
    let retention_handle = if args.retention_hours > 0 {
        let graph = Arc::clone(&graph);
        let horizon_ns = args.retention_hours as i64 * NANOS_PER_HOUR;
        let mut sweep_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(3_600));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let cutoff = spectre_types::TimestampNs::new(
                            std::time::SystemTime::now()
                                .duration_since(std::time::UNIX_EPOCH)
                                .map_or(0, |d| d.as_nanos() as i64)
                                - horizon_ns,
                        );
                        graph.delete_by_timestamp(NodeKind::ChangeEvents, cutoff);
                        graph.delete_by_timestamp(NodeKind::ResourceIdentities, cutoff);
                    }
                    _ = sweep_shutdown.changed() => break,
                }
            }
        }))
    } else {
        None
    };

    wait_for_signal().await;
    tracing::info!("shutdown signal received, draining");

    // Stop producing: reloader stops watches, watch tasks end, the
    // forwarder drains what is left, then closing every command sender lets
    // the indexer finish and flush.
    let _ = shutdown_tx.send(true);
    if let Some((forwarder, reloader_handle)) = watch_handle {
        let _ = reloader_handle.await;
        let _ = forwarder.await;
    }
    if let Some(handle) = retention_handle {
        let _ = handle.await;
    }
    drop(query);
    drop(command_tx);

    tokio::task::spawn_blocking(move || indexer_handle.join())
        .await
        .context("joining the indexer thread")?
        .map_err(|_| anyhow::anyhow!("indexer thread panicked"))?;

    let final_watermark = watermark.get();
    tracing::info!(watermark = %final_watermark, "all state flushed");
    Ok(())
}

fn startup_summary(query: &QueryService) {
    match query.metadata(None, None) {
        Ok(meta) => tracing::info!(
            namespaces = meta.namespaces.len(),
            kinds = meta.kinds.len(),
            total_events = meta.total_events,
            "store ready"
        ),
        Err(e) => tracing::warn!(error = %e, "could not summarize store at startup"),
    }
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot install SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

//! The query service facade.
//!
//! Everything external collaborators (REST, MCP, UI) consume goes through
//! here: search, timelines, metadata, point lookups, export/import, and the
//! root-cause analyzer. Every call takes an optional deadline (default
//! 30 s); on expiry the call fails with `DEADLINE_EXCEEDED` and returns no
//! partial data.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use spectre_analyze::{Analyzer, RootCauseQuery, RootCauseResult};
use spectre_graph::GraphStore;
use spectre_index::{IndexCommand, Watermark};
use spectre_log::{
    Compression, ExportMeta, ImportReport, ScanFilter, SharedEventLog, export_to, lock_log,
};
use spectre_types::{Event, TimestampNs, Uid};
use tokio::sync::{mpsc, oneshot};

use crate::types::{
    EventView, Metadata, RangeQuery, ResourceSummary, ResourceTimeline, StatusSegment, TimeRange,
    segment_events,
};
use crate::{QueryError, QueryResult};

/// Default per-call deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Events attached per resource in `Search` responses.
const RECENT_EVENTS_PER_RESOURCE: usize = 20;

/// The query surface (the §6 contract).
#[derive(Clone)]
pub struct QueryService {
    log: SharedEventLog,
    graph: Arc<GraphStore>,
    analyzer: Analyzer,
    watermark: Arc<Watermark>,
    /// Writes (imports) go to the indexer thread, never directly to the
    /// stores: it is the single writer.
    commands: mpsc::Sender<IndexCommand>,
}

impl QueryService {
    pub fn new(
        log: SharedEventLog,
        graph: Arc<GraphStore>,
        watermark: Arc<Watermark>,
        commands: mpsc::Sender<IndexCommand>,
    ) -> Self {
        let analyzer = Analyzer::new(Arc::clone(&graph));
        Self {
            log,
            graph,
            analyzer,
            watermark,
            commands,
        }
    }

    /// The indexing watermark: readers needing fully-applied state cut
    /// their ranges off here.
    pub fn watermark(&self) -> TimestampNs {
        self.watermark.get()
    }

    /// Resources seen in the range, with their recent change events.
    pub fn search(&self, query: &RangeQuery) -> QueryResult<Vec<ResourceSummary>> {
        validate_range(query)?;
        let deadline = Instant::now() + DEFAULT_DEADLINE;

        let nodes = self.graph.identities_in_range(
            query.start,
            query.end,
            query.namespace.as_deref(),
            query.kind.as_deref(),
        );

        let mut results = Vec::with_capacity(nodes.len());
        for node in nodes {
            check_deadline(deadline)?;
            let events = self.graph.events_for_uid(
                &node.uid,
                query.start,
                query.end,
                Some(RECENT_EVENTS_PER_RESOURCE),
            );
            results.push(ResourceSummary::new(&node, &events));
        }
        Ok(results)
    }

    /// Resources with status segments: runs of consecutive events sharing a
    /// derived status, ordered by start time.
    pub fn timeline(&self, query: &RangeQuery) -> QueryResult<Vec<ResourceTimeline>> {
        validate_range(query)?;
        let deadline = Instant::now() + DEFAULT_DEADLINE;

        let nodes = self.graph.identities_in_range(
            query.start,
            query.end,
            query.namespace.as_deref(),
            query.kind.as_deref(),
        );

        let mut results = Vec::with_capacity(nodes.len());
        for node in nodes {
            check_deadline(deadline)?;
            let events = self
                .graph
                .events_for_uid(&node.uid, query.start, query.end, None);
            results.push(ResourceTimeline {
                resource: ResourceSummary::new(&node, &events),
                segments: segment_events(&events),
            });
        }
        Ok(results)
    }

    /// Cluster-level aggregates, optionally restricted to a time range.
    pub fn metadata(
        &self,
        start: Option<TimestampNs>,
        end: Option<TimestampNs>,
    ) -> QueryResult<Metadata> {
        let start = start.unwrap_or(TimestampNs::ZERO);
        let end = end.unwrap_or(TimestampNs::MAX);
        if start > end {
            return Err(QueryError::invalid("start is after end"));
        }

        let nodes = self.graph.identities_in_range(start, end, None, None);
        let mut namespaces: Vec<String> = nodes
            .iter()
            .filter(|n| !n.namespace.is_empty())
            .map(|n| n.namespace.clone())
            .collect();
        namespaces.sort_unstable();
        namespaces.dedup();

        let mut kinds: Vec<String> = nodes.iter().map(|n| n.gvk.kind.clone()).collect();
        kinds.sort_unstable();
        kinds.dedup();

        let mut groups: Vec<String> = nodes.iter().map(|n| n.gvk.group.clone()).collect();
        groups.sort_unstable();
        groups.dedup();

        let mut resource_counts = std::collections::BTreeMap::new();
        for node in &nodes {
            *resource_counts.entry(node.gvk.kind.clone()).or_insert(0) += 1;
        }

        Ok(Metadata {
            namespaces,
            kinds,
            groups,
            resource_counts,
            total_events: self.graph.total_events(),
            time_range: self
                .graph
                .time_range()
                .map(|(earliest, latest)| TimeRange { earliest, latest }),
        })
    }

    /// Point lookup by uid.
    pub fn get_resource(&self, uid: &Uid) -> QueryResult<ResourceSummary> {
        let node = self
            .graph
            .find_resource_by_uid(uid)
            .ok_or_else(|| QueryError::not_found(format!("resource {uid}")))?;
        let events = self.graph.events_for_uid(
            uid,
            TimestampNs::ZERO,
            TimestampNs::MAX,
            Some(RECENT_EVENTS_PER_RESOURCE),
        );
        Ok(ResourceSummary::new(&node, &events))
    }

    /// Status segments of one resource.
    pub fn get_segments(
        &self,
        uid: &Uid,
        start: Option<TimestampNs>,
        end: Option<TimestampNs>,
    ) -> QueryResult<Vec<StatusSegment>> {
        if self.graph.find_resource_by_uid(uid).is_none() {
            return Err(QueryError::not_found(format!("resource {uid}")));
        }
        let events = self.graph.events_for_uid(
            uid,
            start.unwrap_or(TimestampNs::ZERO),
            end.unwrap_or(TimestampNs::MAX),
            None,
        );
        Ok(segment_events(&events))
    }

    /// Change events of one resource.
    pub fn get_events(
        &self,
        uid: &Uid,
        start: Option<TimestampNs>,
        end: Option<TimestampNs>,
        limit: Option<usize>,
    ) -> QueryResult<Vec<EventView>> {
        if self.graph.find_resource_by_uid(uid).is_none() {
            return Err(QueryError::not_found(format!("resource {uid}")));
        }
        let events = self.graph.events_for_uid(
            uid,
            start.unwrap_or(TimestampNs::ZERO),
            end.unwrap_or(TimestampNs::MAX),
            limit,
        );
        Ok(events.iter().map(EventView::from).collect())
    }

    /// The analyzer entry point.
    pub fn root_cause(&self, query: RootCauseQuery) -> QueryResult<RootCauseResult> {
        if query.resource_uid.is_empty() {
            return Err(QueryError::invalid("resource_uid must not be empty"));
        }
        if query.lookback_ns <= 0 {
            return Err(QueryError::invalid("lookback must be positive"));
        }
        let deadline = Instant::now() + DEFAULT_DEADLINE;
        Ok(self.analyzer.root_cause(query, Some(deadline))?)
    }

    /// Raw event scan straight from the log (the event-log reader
    /// contract). Bounded by `limit` to keep responses finite.
    pub fn scan_events(
        &self,
        start: TimestampNs,
        end: TimestampNs,
        filter: ScanFilter,
        limit: usize,
    ) -> QueryResult<Vec<Event>> {
        if start > end {
            return Err(QueryError::invalid("start is after end"));
        }
        let mut log = lock_log(&self.log);
        let events: Result<Vec<Event>, _> = log.scan(start, end, filter).take(limit).collect();
        Ok(events?)
    }

    /// Binary export of all segments touching the range, streamed into
    /// `out`.
    pub fn export<W: Write>(
        &self,
        out: &mut W,
        start: TimestampNs,
        end: TimestampNs,
        include_open_hour: bool,
        compression: Compression,
    ) -> QueryResult<ExportMeta> {
        if start > end {
            return Err(QueryError::invalid("start is after end"));
        }
        let mut log = lock_log(&self.log);
        Ok(export_to(
            &mut log,
            out,
            start,
            end,
            include_open_hour,
            compression,
        )?)
    }

    /// Import of a binary container or JSON batch, discriminated by content
    /// type. The work runs on the indexer thread so log and graph reflect
    /// the import consistently; this call blocks until it completes.
    pub fn import(
        &self,
        data: Bytes,
        content_type: Option<String>,
        validate: bool,
        overwrite: bool,
    ) -> QueryResult<ImportReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .blocking_send(IndexCommand::Import {
                data,
                content_type,
                validate,
                overwrite,
                reply: reply_tx,
            })
            .map_err(|_| QueryError::Internal("indexer is not running".to_string()))?;
        let report = reply_rx
            .blocking_recv()
            .map_err(|_| QueryError::Internal("indexer dropped the import".to_string()))??;
        Ok(report)
    }
}

fn validate_range(query: &RangeQuery) -> QueryResult<()> {
    if query.start > query.end {
        return Err(QueryError::invalid("start is after end"));
    }
    Ok(())
}

fn check_deadline(deadline: Instant) -> QueryResult<()> {
    if Instant::now() >= deadline {
        return Err(QueryError::DeadlineExceeded);
    }
    Ok(())
}

//! The extractor registry.

use spectre_graph::EdgeUpsert;
use spectre_types::Event;

use crate::GraphLookup;

/// One extractor: a plain description, no dynamic dispatch.
#[derive(Clone, Copy)]
pub struct Extractor {
    pub name: &'static str,
    /// Lower runs first.
    pub priority: u16,
    /// Pure predicate deciding whether `extract` runs for an event.
    pub matches: fn(&Event) -> bool,
    pub extract: fn(&Event, &dyn GraphLookup) -> Vec<EdgeUpsert>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Priority-ordered extractor set.
///
/// Built once at startup; a configuration change builds a new registry and
/// swaps it in whole (the indexer is the only consumer, so the swap is a
/// plain assignment on its thread).
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Extractor>,
}

impl ExtractorRegistry {
    /// Builds a registry from descriptions, sorting by priority. Ties keep
    /// insertion order.
    pub fn new(mut extractors: Vec<Extractor>) -> Self {
        extractors.sort_by_key(|e| e.priority);
        Self { extractors }
    }

    /// The standard pipeline.
    pub fn standard() -> Self {
        Self::new(vec![
            crate::owner_refs::EXTRACTOR,
            crate::pod_spec::EXTRACTOR,
            crate::selector::EXTRACTOR,
            crate::rbac::EXTRACTOR,
            crate::managers::FLUX_EXTRACTOR,
            crate::managers::ARGO_EXTRACTOR,
            crate::involved_object::EXTRACTOR,
        ])
    }

    pub fn extractors(&self) -> &[Extractor] {
        &self.extractors
    }

    /// Runs the matching extractors in priority order, concatenating their
    /// edge upserts.
    pub fn run(&self, event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
        let mut edges = Vec::new();
        for extractor in &self.extractors {
            if !(extractor.matches)(event) {
                continue;
            }
            let produced = (extractor.extract)(event, lookup);
            if !produced.is_empty() {
                tracing::trace!(
                    extractor = extractor.name,
                    count = produced.len(),
                    event_id = %event.id,
                    "extractor produced edges"
                );
            }
            edges.extend(produced);
        }
        edges
    }
}

//! # spectre-analyze: root-cause analysis
//!
//! Given a symptom (a resource uid and a failure time), build the bounded
//! causal subgraph around it, enumerate configuration changes inside the
//! failure window as candidate causes, score the path from each candidate
//! to the symptom with a five-factor confidence model, and return a ranked
//! explanation with its evidence.
//!
//! Everything here is a pure read over the graph store: queries run in
//! parallel, results are deterministic for identical inputs, and confidence
//! never exceeds 0.85.

mod analyzer;
mod scoring;
mod subgraph;
mod types;

#[cfg(test)]
mod tests;

pub use analyzer::Analyzer;
pub use types::{
    AnalyzeError, AnalyzeResult, CausalPath, ConfidenceFactors, EventSummary, NodeDescriptor,
    PathStep, RootCauseQuery, RootCauseResult, SubgraphEdge, SubgraphView, CONFIDENCE_CAP,
    DEFAULT_LOOKBACK_NS, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PATHS, DEFAULT_MIN_CONFIDENCE,
    EVENTS_PER_NODE_CAP, MAX_DEPTH_CAP, MAX_PATHS_CAP,
};

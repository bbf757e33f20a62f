//! # spectre-extract: Edge extraction pipeline
//!
//! A fixed, priority-ordered set of extractors. Each extractor is a plain
//! description — name, priority, a pure `matches` predicate, and an
//! `extract` function — assembled into an [`ExtractorRegistry`] at startup.
//! No trait objects, no inheritance: swapping the pipeline is replacing the
//! registry value.
//!
//! Extractors are stateless. They read the cluster picture only through the
//! [`GraphLookup`] view and emit [`EdgeUpsert`]s; they never create identity
//! or change-event nodes (only the indexer does). An emitted edge whose
//! endpoint is unknown is dropped silently by the store.
//!
//! ## Built-in pipeline
//!
//! | priority | name | edges |
//! |----------|------|-------|
//! | 10 | `owner-references` | OWNS |
//! | 20 | `pod-spec` | SCHEDULED_ON, USES_SERVICE_ACCOUNT, REFERENCES_SPEC |
//! | 30 | `selector` | SELECTS, REFERENCES_SPEC (Ingress backends) |
//! | 40 | `rbac` | GRANTS_TO |
//! | 50 | `flux-manager` | MANAGES |
//! | 51 | `argo-manager` | MANAGES |
//! | 60 | `involved-object` | REFERENCES_SPEC (Event → involved object) |

mod involved_object;
mod lookup;
mod managers;
mod owner_refs;
mod pod_spec;
mod rbac;
mod registry;
mod selector;


pub use lookup::GraphLookup;
pub use registry::{Extractor, ExtractorRegistry};

pub use spectre_graph::EdgeUpsert;

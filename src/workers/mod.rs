// src/workers/mod.rs
pub mod canonical;
pub mod legal;
pub mod municipal;
pub mod registry;
pub mod result;

use std::sync::Arc;

use crate::ingest::config::IngestSettings;
use crate::ingest::fetch::PageFetcher;
use crate::sources::SourceCatalog;
use crate::store::ProgramStore;

pub use registry::{IngestContext, IngestWorker, Orchestrator, SourceDescriptor, SourceKind, UnknownSource, WorkerRegistry};
pub use result::{IngestRunResult, IngestStats, RunError, TotalStats, WorkerOutput};

/// Standard catalog and registry over the given fetcher and store.
pub fn standard_orchestrator(
    settings: IngestSettings,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ProgramStore>,
) -> Orchestrator {
    let catalog = Arc::new(SourceCatalog::standard());
    let registry = WorkerRegistry::standard(&catalog);
    let ctx = IngestContext::new(catalog, Arc::new(settings), fetcher, store);
    Orchestrator::new(registry, ctx)
}

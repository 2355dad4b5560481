// src/lib.rs
// Public library surface for the service, the CLI and integration tests.

pub mod api;
pub mod ingest;
pub mod metrics;
pub mod sources;
pub mod store;
pub mod text;
pub mod workers;

pub use crate::api::router;
pub use crate::ingest::config::IngestSettings;
pub use crate::sources::SourceCatalog;
pub use crate::workers::{standard_orchestrator, IngestRunResult, Orchestrator};

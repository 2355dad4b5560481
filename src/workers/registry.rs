// src/workers/registry.rs
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::canonical::CanonicalWorker;
use super::legal::LegalBackstopWorker;
use super::municipal::MunicipalWorker;
use super::result::{IngestRunResult, WorkerOutput};
use crate::ingest::classify::CategoryClassifier;
use crate::ingest::config::IngestSettings;
use crate::ingest::fetch::PageFetcher;
use crate::sources::{SourceCatalog, DIARIO_REPUBLICA, NATIONAL_SOURCE_IDS};
use crate::store::ProgramStore;

pub const MUNICIPAL_WORKER_ID: &str = "municipios-portugal";
pub const GROUP_CORE_NATIONAL: &str = "core-national";
pub const GROUP_MUNICIPAL: &str = "municipal";
pub const GROUP_ALL: &str = "all";

/// Shared dependencies handed to every worker.
#[derive(Clone)]
pub struct IngestContext {
    pub catalog: Arc<SourceCatalog>,
    pub settings: Arc<IngestSettings>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub store: Arc<dyn ProgramStore>,
    pub classifier: Arc<CategoryClassifier>,
}

impl IngestContext {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        settings: Arc<IngestSettings>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ProgramStore>,
    ) -> Self {
        let classifier = Arc::new(CategoryClassifier::new(
            settings.classifier.precedence.clone(),
        ));
        Self {
            catalog,
            settings,
            fetcher,
            store,
            classifier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    National,
    Municipal,
    LegalBackstop,
    Group,
}

/// What `available_sources` lists for each runnable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub description: String,
}

#[async_trait]
pub trait IngestWorker: Send + Sync {
    fn descriptor(&self) -> SourceDescriptor;
    async fn run(&self, ctx: &IngestContext) -> Result<WorkerOutput>;
}

/// Named, ordered list of worker ids.
#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub descriptor: SourceDescriptor,
    pub aliases: Vec<String>,
    pub members: Vec<String>,
}

/// Requested id is neither a worker nor a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSource {
    pub requested: String,
    pub valid: Vec<String>,
}

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown source \"{}\"; valid sources: {}",
            self.requested,
            self.valid.join(", ")
        )
    }
}

impl std::error::Error for UnknownSource {}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<Arc<dyn IngestWorker>>,
    groups: Vec<SourceGroup>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical national workers, the legal backstop and municipal
    /// discovery, grouped as `core-national`, `municipal` and `all`.
    pub fn standard(catalog: &SourceCatalog) -> Self {
        let mut reg = Self::new();
        let mut national = Vec::new();
        for id in NATIONAL_SOURCE_IDS {
            if let Some(source) = catalog.source(id) {
                reg.register(Arc::new(CanonicalWorker::new(source.clone())));
                national.push(id.to_string());
            }
        }
        reg.register(Arc::new(LegalBackstopWorker));
        national.push(DIARIO_REPUBLICA.to_string());
        reg.register(Arc::new(MunicipalWorker));
        let municipal = vec![MUNICIPAL_WORKER_ID.to_string()];

        reg.add_group(SourceGroup {
            descriptor: group_descriptor(
                GROUP_CORE_NATIONAL,
                "Core nacional",
                "Executa todos os workers nacionais e o backstop legal.",
            ),
            aliases: vec!["core-nacional".to_string()],
            members: national.clone(),
        });
        reg.add_group(SourceGroup {
            descriptor: group_descriptor(
                GROUP_MUNICIPAL,
                "Cobertura municipal",
                "Executa workers municipais (308).",
            ),
            aliases: Vec::new(),
            members: municipal.clone(),
        });
        reg.add_group(SourceGroup {
            descriptor: group_descriptor(
                GROUP_ALL,
                "Todas as fontes",
                "Executa todos os workers disponíveis.",
            ),
            aliases: Vec::new(),
            members: national.into_iter().chain(municipal).collect(),
        });
        reg
    }

    /// Add or replace a worker under its descriptor id.
    pub fn register(&mut self, worker: Arc<dyn IngestWorker>) {
        let id = worker.descriptor().id;
        if let Some(slot) = self.workers.iter_mut().find(|w| w.descriptor().id == id) {
            *slot = worker;
        } else {
            self.workers.push(worker);
        }
    }

    pub fn add_group(&mut self, group: SourceGroup) {
        self.groups.retain(|g| g.descriptor.id != group.descriptor.id);
        self.groups.push(group);
    }

    pub fn worker(&self, id: &str) -> Option<Arc<dyn IngestWorker>> {
        self.workers
            .iter()
            .find(|w| w.descriptor().id == id)
            .cloned()
    }

    fn group(&self, id: &str) -> Option<&SourceGroup> {
        self.groups
            .iter()
            .find(|g| g.descriptor.id == id || g.aliases.iter().any(|a| a == id))
    }

    /// Direct worker ids followed by group ids.
    pub fn available_sources(&self) -> Vec<SourceDescriptor> {
        self.workers
            .iter()
            .map(|w| w.descriptor())
            .chain(self.groups.iter().map(|g| g.descriptor.clone()))
            .collect()
    }

    /// Worker ids to run for `id`, in declared order.
    pub fn targets(&self, id: &str) -> Result<Vec<String>, UnknownSource> {
        if let Some(g) = self.group(id) {
            return Ok(g.members.clone());
        }
        if self.worker(id).is_some() {
            return Ok(vec![id.to_string()]);
        }
        Err(UnknownSource {
            requested: id.to_string(),
            valid: self
                .available_sources()
                .into_iter()
                .map(|d| d.id)
                .collect(),
        })
    }
}

fn group_descriptor(id: &str, name: &str, description: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        kind: SourceKind::Group,
        description: description.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Runs workers sequentially. One run at a time; concurrent callers queue.
pub struct Orchestrator {
    registry: WorkerRegistry,
    ctx: IngestContext,
    run_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(registry: WorkerRegistry, ctx: IngestContext) -> Self {
        crate::ingest::ensure_metrics_described();
        Self {
            registry,
            ctx,
            run_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn context(&self) -> &IngestContext {
        &self.ctx
    }

    pub fn available_sources(&self) -> Vec<SourceDescriptor> {
        self.registry.available_sources()
    }

    /// Run a worker or group. Worker errors and panics become failed entries;
    /// only an unknown id is an error.
    pub async fn run(&self, source: &str) -> Result<Vec<IngestRunResult>, UnknownSource> {
        let targets = self.registry.targets(source)?;
        let _guard = self.run_lock.lock().await;
        tracing::info!(target: "ingest", requested = source, targets = ?targets, "ingest run started");

        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            results.push(self.run_one(target).await);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(
            target: "ingest",
            requested = source,
            sources = results.len(),
            failed,
            "ingest run finished"
        );
        Ok(results)
    }

    async fn run_one(&self, id: &str) -> IngestRunResult {
        let Some(worker) = self.registry.worker(id) else {
            return IngestRunResult::failure(id, format!("no worker registered for source \"{id}\""));
        };
        let started = Instant::now();
        tracing::info!(target: "ingest", source = id, "worker started");

        let outcome = AssertUnwindSafe(worker.run(&self.ctx)).catch_unwind().await;
        histogram!("ingest_worker_duration_ms", "source" => id.to_string())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let result = match outcome {
            Ok(Ok(output)) => output.normalize(id),
            Ok(Err(e)) => {
                tracing::error!(target: "ingest", source = id, error = ?e, "worker failed");
                IngestRunResult::failure(id, format!("{e:#}"))
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!(target: "ingest", source = id, panic = %msg, "worker panicked");
                IngestRunResult::failure(id, msg)
            }
        };
        if !result.success {
            counter!("ingest_worker_failures_total", "source" => id.to_string()).increment(1);
        }
        tracing::info!(
            target: "ingest",
            source = id,
            success = result.success,
            found = result.stats.found,
            new = result.stats.new,
            updated = result.stats.updated,
            skipped = result.stats.skipped,
            errors = result.stats.errors,
            duration = %result.stats.duration,
            "worker finished"
        );
        result
    }
}

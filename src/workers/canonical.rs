// src/workers/canonical.rs
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

use super::registry::{IngestContext, IngestWorker, SourceDescriptor, SourceKind};
use super::result::{RunTally, WorkerOutput};
use crate::ingest::classify::{is_relevant_to_energy_efficiency, should_block_title};
use crate::ingest::discovery::{discover, DiscoveryOptions};
use crate::ingest::extract::extract_details;
use crate::ingest::persist::{persist_candidate, PersistOverrides};
use crate::ingest::types::{DiscoveredCandidate, DiscoveryContext};
use crate::sources::CanonicalSourceDefinition;

/// Seed-driven worker for one national canonical source: discover on every
/// seed URL, optionally enrich from detail pages, persist.
pub struct CanonicalWorker {
    source: CanonicalSourceDefinition,
}

impl CanonicalWorker {
    pub fn new(source: CanonicalSourceDefinition) -> Self {
        Self { source }
    }

    /// Candidates from every seed, first occurrence of a URL wins. Deep-crawled
    /// sources also drop links with no energy-efficiency wording.
    async fn collect(&self, ctx: &IngestContext) -> Vec<DiscoveredCandidate> {
        let opts = DiscoveryOptions::for_source(&self.source);
        let delay = Duration::from_millis(ctx.settings.seed_delay_ms);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for url in &self.source.seed_urls {
            let found = discover(
                ctx.fetcher.as_ref(),
                url,
                &DiscoveryContext::default(),
                &opts,
            )
            .await;
            tracing::info!(target: "ingest", source = self.source.id, url = %url, found = found.len(), "seed scanned");
            for c in found {
                if self.source.deep_crawl
                    && !is_relevant_to_energy_efficiency(&format!(
                        "{} {}",
                        c.title,
                        c.description.as_deref().unwrap_or_default()
                    ))
                {
                    continue;
                }
                if seen.insert(c.url.clone()) {
                    out.push(c);
                }
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        out.truncate(ctx.settings.max_candidates_per_source);
        out
    }
}

#[async_trait]
impl IngestWorker for CanonicalWorker {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: self.source.id.to_string(),
            name: self.source.name.to_string(),
            kind: SourceKind::National,
            description: self.source.description.to_string(),
        }
    }

    async fn run(&self, ctx: &IngestContext) -> Result<WorkerOutput> {
        let mut tally = RunTally::start();
        tracing::info!(
            target: "ingest",
            source = self.source.id,
            seeds = self.source.seed_urls.len(),
            deep_crawl = self.source.deep_crawl,
            "canonical worker started"
        );

        let candidates = self.collect(ctx).await;
        tally.found = candidates.len() as u64;

        let persist_delay = Duration::from_millis(ctx.settings.persist_delay_ms);
        let deep_delay = Duration::from_millis(ctx.settings.deep_crawl_delay_ms);
        let overrides = PersistOverrides::default();

        for mut candidate in candidates {
            if self.source.deep_crawl {
                let details = extract_details(
                    ctx.fetcher.as_ref(),
                    &candidate.url,
                    &ctx.classifier,
                    deep_delay,
                )
                .await;
                if details.title.as_deref().is_some_and(should_block_title) {
                    tracing::debug!(target: "ingest", source = self.source.id, url = %candidate.url, "detail page is boilerplate");
                    tally.skipped += 1;
                    continue;
                }
                details.apply_to(&mut candidate);
            }
            match persist_candidate(ctx.store.as_ref(), &self.source, &candidate, &overrides).await
            {
                Ok(outcome) => tally.record(outcome),
                Err(e) => {
                    tracing::error!(
                        target: "ingest",
                        source = self.source.id,
                        title = %candidate.title,
                        url = %candidate.url,
                        error = ?e,
                        "persist failed"
                    );
                    tally.error(Some(&candidate.title), Some(&candidate.url), format!("{e:#}"));
                }
            }
            if !persist_delay.is_zero() {
                tokio::time::sleep(persist_delay).await;
            }
        }

        tracing::info!(
            target: "ingest",
            source = self.source.id,
            found = tally.found,
            new = tally.new,
            updated = tally.updated,
            skipped = tally.skipped,
            errors = tally.errors.len(),
            "canonical worker finished"
        );
        Ok(tally.finish())
    }
}

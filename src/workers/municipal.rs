// src/workers/municipal.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

use super::registry::{IngestContext, IngestWorker, SourceDescriptor, SourceKind, MUNICIPAL_WORKER_ID};
use super::result::{RunTally, WorkerOutput};
use crate::ingest::discovery::{discover, DiscoveryOptions};
use crate::ingest::extract::extract_details;
use crate::ingest::municipal::{build_probe_urls, MunicipalSiteResolver, MunicipalitySite, ResolveContext};
use crate::ingest::persist::{persist_candidate, PersistOverrides};
use crate::ingest::types::{DiscoveredCandidate, DiscoveryContext, ProgramType, SourceType};
use crate::sources::{CanonicalSourceDefinition, PORTAL_AUTARQUICO};
use crate::text::normalize_text;

/// Resolve every municipality's website, probe its home and sub-path hints,
/// persist what looks like a program as a municipal program.
pub struct MunicipalWorker;

impl MunicipalWorker {
    /// Candidates from a municipality's probe URLs, deduplicated by URL and
    /// title.
    async fn scan_site(
        ctx: &IngestContext,
        source: &CanonicalSourceDefinition,
        site: &MunicipalitySite,
    ) -> Vec<DiscoveredCandidate> {
        // municipal sites are not on the index host allowlist
        let opts = DiscoveryOptions {
            keywords: source.keywords.clone(),
            allowed_hosts: Vec::new(),
            require_application_intent: true,
        };
        let dctx = DiscoveryContext {
            municipality: Some(site.name.clone()),
            district: Some(site.district.clone()),
        };
        let urls = build_probe_urls(
            &site.website,
            ctx.settings.municipal_path_limit,
            &source.discovery_path_hints,
        );

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for url in &urls {
            for c in discover(ctx.fetcher.as_ref(), url, &dctx, &opts).await {
                if seen.insert((c.url.clone(), normalize_text(&c.title))) {
                    out.push(c);
                }
            }
        }
        out
    }
}

#[async_trait]
impl IngestWorker for MunicipalWorker {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: MUNICIPAL_WORKER_ID.to_string(),
            name: "Cobertura Municipal (308)".to_string(),
            kind: SourceKind::Municipal,
            description: "Discovery municipal por índice oficial + secções alvo.".to_string(),
        }
    }

    async fn run(&self, ctx: &IngestContext) -> Result<WorkerOutput> {
        let mut tally = RunTally::start();
        let source = ctx
            .catalog
            .source(PORTAL_AUTARQUICO)
            .ok_or_else(|| anyhow!("municipal index source {PORTAL_AUTARQUICO} missing from catalog"))?;

        let sites = MunicipalSiteResolver::default()
            .resolve(&ResolveContext {
                fetcher: ctx.fetcher.as_ref(),
                catalog: &ctx.catalog,
                settings: &ctx.settings,
                index_source: source,
            })
            .await;

        let selected: Vec<&MunicipalitySite> = ctx
            .catalog
            .municipalities()
            .iter()
            .filter_map(|m| sites.get(&m.id))
            .take(ctx.settings.municipal_limit)
            .collect();

        let delay = Duration::from_millis(ctx.settings.municipal_request_delay_ms);
        let persist_delay = Duration::from_millis(ctx.settings.persist_delay_ms);
        tracing::info!(
            target: "ingest",
            municipal_limit = ctx.settings.municipal_limit,
            path_limit = ctx.settings.municipal_path_limit,
            request_delay_ms = ctx.settings.municipal_request_delay_ms,
            selected = selected.len(),
            "municipal discovery started"
        );

        for site in &selected {
            let discovered = Self::scan_site(ctx, source, site).await;
            tally.found += discovered.len() as u64;

            let overrides = PersistOverrides {
                program_type: Some(ProgramType::Municipal),
                entity: Some(format!("Câmara Municipal de {}", site.name)),
                source_type: Some(SourceType::MunicipalSite),
            };
            for mut candidate in discovered {
                if source.deep_crawl {
                    extract_details(ctx.fetcher.as_ref(), &candidate.url, &ctx.classifier, delay)
                        .await
                        .apply_to(&mut candidate);
                }
                candidate.municipality = Some(site.name.clone());
                candidate.district = Some(site.district.clone());

                match persist_candidate(ctx.store.as_ref(), source, &candidate, &overrides).await {
                    Ok(outcome) => tally.record(outcome),
                    Err(e) => {
                        tracing::error!(
                            target: "ingest",
                            municipality = %site.name,
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
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(
            target: "ingest",
            found = tally.found,
            new = tally.new,
            updated = tally.updated,
            skipped = tally.skipped,
            errors = tally.errors.len(),
            municipalities_covered = selected.len(),
            municipalities_discovered = sites.len(),
            "municipal discovery finished"
        );

        let covered = selected.len();
        let mut out = tally.finish();
        out.extra
            .insert("municipalitiesCovered".into(), json!(covered));
        out.extra
            .insert("municipalitiesDiscovered".into(), json!(sites.len()));
        Ok(out)
    }
}

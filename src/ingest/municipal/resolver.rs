// src/ingest/municipal/resolver.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use super::csv::{parse_csv_table, parse_sites_from_rows};
use super::{
    normalize_municipality_label, normalize_official_seed_url, HostPreference, MunicipalitySite,
    SiteMap,
};
use crate::ingest::config::IngestSettings;
use crate::ingest::discovery::resolve_link;
use crate::ingest::fetch::{Accept, PageFetcher};
use crate::sources::{CanonicalSourceDefinition, SourceCatalog};
use crate::text::normalize_text;

/// Everything a resolution tier may use.
pub struct ResolveContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub catalog: &'a SourceCatalog,
    pub settings: &'a IngestSettings,
    /// Canonical source describing the official municipal index.
    pub index_source: &'a CanonicalSourceDefinition,
}

/// One tier of municipal website resolution.
#[async_trait]
pub trait SiteResolverStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<SiteMap>;
}

/// Merge `found` into `into`, keeping whichever URL the preference favours.
pub fn merge_sites(into: &mut SiteMap, found: SiteMap, preference: &HostPreference) {
    for (id, site) in found {
        let current = into.get(&id).map(|s| s.website.as_str());
        if preference.prefers(&site.website, current) {
            into.insert(id, site);
        }
    }
}

/// Tier 1: links on the official municipal index whose label names a
/// municipality.
pub struct OfficialIndexStrategy;

impl OfficialIndexStrategy {
    pub fn sites_from_html(
        html: &str,
        base_url: &str,
        catalog: &SourceCatalog,
        preference: &HostPreference,
    ) -> SiteMap {
        let mut sites = SiteMap::new();
        let Ok(base) = Url::parse(base_url) else {
            return sites;
        };
        let Ok(anchors) = Selector::parse("a[href]") else {
            return sites;
        };
        let doc = Html::parse_document(html);

        for a in doc.select(&anchors) {
            let Some(abs) = a.value().attr("href").and_then(|h| resolve_link(&base, h)) else {
                continue;
            };
            let text = a.text().collect::<Vec<_>>().join(" ");
            let label = [
                Some(text.as_str()),
                a.value().attr("title"),
                a.value().attr("aria-label"),
                a.value().attr("data-original-title"),
            ]
            .into_iter()
            .flatten()
            .map(normalize_municipality_label)
            .find(|l| !l.is_empty());
            let Some(m) = label.and_then(|l| catalog.municipality_by_name(&l)) else {
                continue;
            };
            let website = abs.to_string();
            let current = sites.get(&m.id).map(|s: &MunicipalitySite| s.website.as_str());
            if preference.prefers(&website, current) {
                sites.insert(m.id.clone(), MunicipalitySite::new(m, website));
            }
        }
        sites
    }
}

#[async_trait]
impl SiteResolverStrategy for OfficialIndexStrategy {
    fn name(&self) -> &'static str {
        "official-index"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<SiteMap> {
        let mut seen = HashSet::new();
        let mut sites = SiteMap::new();
        for seed in ctx.index_source.seed_urls.iter() {
            let seed = normalize_official_seed_url(seed);
            if !seen.insert(seed.clone()) {
                continue;
            }
            let Some(html) = ctx.fetcher.fetch_html(&seed).await else {
                tracing::warn!(target: "ingest", url = %seed, "municipal index unavailable");
                continue;
            };
            let found = Self::sites_from_html(
                &html,
                &seed,
                ctx.catalog,
                &ctx.settings.host_preference,
            );
            merge_sites(&mut sites, found, &ctx.settings.host_preference);
        }
        Ok(sites)
    }
}

/// Tier 2: configured open-data CSV/TSV resources. The first resource that
/// yields any site wins.
pub struct OpenDataCsvStrategy;

/// Fetch each URL as CSV and return the first non-empty parse.
async fn first_sites_from_resources(
    ctx: &ResolveContext<'_>,
    urls: &[String],
) -> SiteMap {
    for url in urls {
        let Some(body) = ctx.fetcher.fetch(url, Accept::Csv).await else {
            continue;
        };
        let rows = parse_csv_table(&body);
        match parse_sites_from_rows(&rows, ctx.catalog, &ctx.settings.host_preference) {
            None => {
                tracing::warn!(
                    target: "ingest",
                    url = %url,
                    rows = rows.len(),
                    header = ?rows.first(),
                    "municipal website dataset missing expected columns"
                );
            }
            Some(sites) => {
                tracing::info!(target: "ingest", url = %url, sites = sites.len(), "municipal website dataset loaded");
                if !sites.is_empty() {
                    return sites;
                }
            }
        }
    }
    SiteMap::new()
}

#[async_trait]
impl SiteResolverStrategy for OpenDataCsvStrategy {
    fn name(&self) -> &'static str {
        "open-data-csv"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<SiteMap> {
        Ok(first_sites_from_resources(ctx, &ctx.settings.municipal_resource_urls).await)
    }
}

/// Tier 3: dataset-catalog API listing the dataset's resources.
pub struct CatalogApiStrategy;

impl CatalogApiStrategy {
    /// Every http(s) string stored under a key hinting at a URL, download,
    /// latest version or resource. Order of first appearance.
    pub fn extract_resource_urls(payload: &serde_json::Value) -> Vec<String> {
        fn visit(v: &serde_json::Value, out: &mut Vec<String>) {
            match v {
                serde_json::Value::Array(items) => items.iter().for_each(|i| visit(i, out)),
                serde_json::Value::Object(map) => {
                    for (key, nested) in map {
                        if let serde_json::Value::String(s) = nested {
                            let lower = s.to_ascii_lowercase();
                            let key = normalize_text(key);
                            if (lower.starts_with("http://") || lower.starts_with("https://"))
                                && ["url", "download", "latest", "resource"]
                                    .iter()
                                    .any(|h| key.contains(h))
                            {
                                out.push(s.clone());
                            }
                        }
                        visit(nested, out);
                    }
                }
                _ => {}
            }
        }
        let mut all = Vec::new();
        visit(payload, &mut all);
        let mut seen = HashSet::new();
        all.retain(|u| seen.insert(u.clone()));
        all
    }

    pub fn is_likely_csv(url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        path.ends_with(".csv") || path.ends_with(".tsv") || lower.contains("/r/")
    }
}

#[async_trait]
impl SiteResolverStrategy for CatalogApiStrategy {
    fn name(&self) -> &'static str {
        "catalog-api"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<SiteMap> {
        let url = &ctx.settings.municipal_catalog_url;
        let body = ctx
            .fetcher
            .fetch(url, Accept::Json)
            .await
            .ok_or_else(|| anyhow!("dataset catalog unavailable: {url}"))?;
        let payload: serde_json::Value = serde_json::from_str(&body)?;
        let resources: Vec<String> = Self::extract_resource_urls(&payload)
            .into_iter()
            .filter(|u| Self::is_likely_csv(u))
            .collect();
        tracing::info!(target: "ingest", url = %url, resources = resources.len(), "dataset catalog read");
        Ok(first_sites_from_resources(ctx, &resources).await)
    }
}

/// Ordered chain of resolution tiers. A tier runs only while some
/// municipality still lacks its own (non-aggregator) website.
pub struct MunicipalSiteResolver {
    strategies: Vec<Box<dyn SiteResolverStrategy>>,
}

impl Default for MunicipalSiteResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(OfficialIndexStrategy),
            Box::new(OpenDataCsvStrategy),
            Box::new(CatalogApiStrategy),
        ])
    }
}

impl MunicipalSiteResolver {
    pub fn new(strategies: Vec<Box<dyn SiteResolverStrategy>>) -> Self {
        Self { strategies }
    }

    fn own_site_count(sites: &SiteMap, preference: &HostPreference) -> usize {
        sites
            .values()
            .filter(|s| !preference.is_aggregator_url(&s.website))
            .count()
    }

    /// Run the tiers and merge their results. Tier errors are logged and
    /// skipped; total failure gives an empty map.
    pub async fn resolve(&self, ctx: &ResolveContext<'_>) -> SiteMap {
        let preference = &ctx.settings.host_preference;
        let wanted = ctx.catalog.municipalities().len();
        let mut merged = SiteMap::new();

        for strategy in &self.strategies {
            if Self::own_site_count(&merged, preference) >= wanted {
                tracing::debug!(target: "ingest", tier = strategy.name(), "all municipalities resolved, skipping tier");
                break;
            }
            match strategy.resolve(ctx).await {
                Ok(found) => {
                    tracing::info!(target: "ingest", tier = strategy.name(), sites = found.len(), "municipal tier finished");
                    merge_sites(&mut merged, found, preference);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", tier = strategy.name(), error = ?e, "municipal tier failed");
                }
            }
        }

        tracing::info!(
            target: "ingest",
            municipalities = wanted,
            resolved = merged.len(),
            "municipal index loaded"
        );
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_urls_are_collected_recursively_and_filtered() {
        let payload = json!({
            "title": "Municípios",
            "page": "https://dados.gov.pt/pt/datasets/x/",
            "resources": [
                {"url": "https://dados.gov.pt/s/resources/x/lista.csv", "format": "csv"},
                {"latest": "https://dados.gov.pt/pt/datasets/r/abc"},
                {"url": "https://dados.gov.pt/s/resources/x/lista.csv"},
                {"url": "https://dados.gov.pt/s/resources/x/readme.pdf"}
            ]
        });
        let urls = CatalogApiStrategy::extract_resource_urls(&payload);
        assert_eq!(
            urls,
            vec![
                "https://dados.gov.pt/s/resources/x/lista.csv",
                "https://dados.gov.pt/pt/datasets/r/abc",
                "https://dados.gov.pt/s/resources/x/readme.pdf",
            ]
        );
        let csv: Vec<_> = urls
            .into_iter()
            .filter(|u| CatalogApiStrategy::is_likely_csv(u))
            .collect();
        assert_eq!(csv.len(), 2);
    }

    #[test]
    fn index_links_match_labels_and_attributes() {
        let catalog = SourceCatalog::standard();
        let html = r#"
            <a href="/pt-PT/municipios/braga">Município de Braga</a>
            <a href="https://www.cm-guimaraes.pt/" title="Câmara Municipal de Guimarães"><img></a>
            <a href="/pt-PT/noticias">Notícias</a>"#;
        let sites = OfficialIndexStrategy::sites_from_html(
            html,
            "https://portalautarquico.dgal.gov.pt/pt-PT/municipios/",
            &catalog,
            &HostPreference::default(),
        );
        assert_eq!(sites.len(), 2);
        assert_eq!(
            sites["braga-braga"].website,
            "https://portalautarquico.dgal.gov.pt/pt-PT/municipios/braga"
        );
        assert_eq!(sites["braga-guimaraes"].website, "https://www.cm-guimaraes.pt/");
    }
}

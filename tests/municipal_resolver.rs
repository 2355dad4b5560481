// tests/municipal_resolver.rs
//
// The three website-resolution tiers against fixture pages.
//
// Covered:
// - official index links are replaced by own sites found in the open-data CSV
// - a dataset without usable columns falls through to the next resource
// - the catalog API tier reads its resource list and merges new sites
// - later tiers are skipped once every municipality has its own site
// - a failing tier is logged and skipped

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use subsidy_ingest::ingest::config::IngestSettings;
use subsidy_ingest::ingest::fetch::FixtureFetcher;
use subsidy_ingest::ingest::municipal::{
    MunicipalSiteResolver, MunicipalitySite, ResolveContext, SiteMap, SiteResolverStrategy,
};
use subsidy_ingest::sources::{SourceCatalog, PORTAL_AUTARQUICO};

const INDEX_URL: &str = "https://portalautarquico.dgal.gov.pt/pt-PT/municipios/";
const BROKEN_CSV: &str = "https://dados.gov.pt/r/broken";
const GOOD_CSV: &str = "https://dados.gov.pt/s/resources/municipios/websites.csv";
const SPARE_CSV: &str = "https://dados.gov.pt/s/resources/municipios/spare.csv";
const CATALOG_URL: &str = "https://dados.gov.pt/api/1/datasets/municipios-websites/";
const CATALOG_CSV: &str = "https://dados.gov.pt/s/resources/municipios/historico.csv";

fn settings() -> IngestSettings {
    IngestSettings {
        municipal_resource_urls: vec![BROKEN_CSV.into(), GOOD_CSV.into(), SPARE_CSV.into()],
        municipal_catalog_url: CATALOG_URL.into(),
        ..IngestSettings::without_delays()
    }
}

fn fixture_fetcher() -> FixtureFetcher {
    FixtureFetcher::new()
        .with_page(
            INDEX_URL,
            r#"<ul>
                 <li><a href="/pt-PT/municipios/braga">Município de Braga</a></li>
                 <li><a href="/pt-PT/municipios/lisboa" title="Câmara Municipal de Lisboa"><img src="lisboa.png"></a></li>
                 <li><a href="/pt-PT/contactos">Contactos</a></li>
               </ul>"#,
        )
        .with_page(BROKEN_CSV, "Nome,Descrição\nBraga,capital do Minho\n")
        .with_page(
            GOOD_CSV,
            "\u{feff}Município;Distrito;Website\n\
             Braga;Braga;www.cm-braga.pt\n\
             Lisboa;Lisboa;\"https://www.lisboa.pt\"\n\
             Porto;Porto;https://www.cm-porto.pt/\n\
             Atlântida;-;atlantida.pt\n",
        )
        .with_page(SPARE_CSV, "Município;Website\nFaro;www.cm-faro.pt\n")
        .with_page(
            CATALOG_URL,
            json!({
                "title": "Municípios portugueses: websites",
                "resources": [
                    {"title": "leia-me", "url": "https://dados.gov.pt/s/resources/municipios/readme.pdf"},
                    {"title": "histórico", "latest": CATALOG_CSV}
                ]
            })
            .to_string(),
        )
        .with_page(
            CATALOG_CSV,
            "concelho\tsitio web\nÉvora\tcm-evora.pt\nBraga\tbraga.portalautarquico.pt\n",
        )
}

#[tokio::test]
async fn tiers_merge_with_own_sites_preferred() {
    let catalog = SourceCatalog::standard();
    let settings = settings();
    let fetcher = fixture_fetcher();
    let ctx = ResolveContext {
        fetcher: &fetcher,
        catalog: &catalog,
        settings: &settings,
        index_source: catalog.source(PORTAL_AUTARQUICO).expect("index source"),
    };

    let sites = MunicipalSiteResolver::default().resolve(&ctx).await;

    let websites: Vec<(&str, &str)> = sites
        .iter()
        .map(|(id, s)| (id.as_str(), s.website.as_str()))
        .collect();
    assert_eq!(
        websites,
        vec![
            ("braga-braga", "https://www.cm-braga.pt/"),
            ("evora-evora", "https://cm-evora.pt/"),
            ("lisboa-lisboa", "https://www.lisboa.pt/"),
            ("porto-porto", "https://www.cm-porto.pt/"),
        ]
    );
    assert_eq!(sites["evora-evora"].district, "Évora");

    let requested = fetcher.requested();
    // the first usable dataset wins, the spare one is never read
    assert!(requested.contains(&GOOD_CSV.to_string()));
    assert!(!requested.contains(&SPARE_CSV.to_string()));
    // the catalog lists a pdf that is not a csv resource
    assert!(!requested.iter().any(|u| u.ends_with("readme.pdf")));
    assert!(requested.contains(&CATALOG_CSV.to_string()));
}

#[tokio::test]
async fn unreachable_sources_give_an_empty_map() {
    let catalog = SourceCatalog::standard();
    let settings = settings();
    let fetcher = FixtureFetcher::new();
    let ctx = ResolveContext {
        fetcher: &fetcher,
        catalog: &catalog,
        settings: &settings,
        index_source: catalog.source(PORTAL_AUTARQUICO).unwrap(),
    };

    let sites = MunicipalSiteResolver::default().resolve(&ctx).await;
    assert!(sites.is_empty());
    // every tier was attempted
    assert!(fetcher.requested().contains(&CATALOG_URL.to_string()));
}

/// Resolves every municipality to a fixed host pattern.
struct Everything {
    aggregator: bool,
}

#[async_trait]
impl SiteResolverStrategy for Everything {
    fn name(&self) -> &'static str {
        "everything"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<SiteMap> {
        Ok(ctx
            .catalog
            .municipalities()
            .iter()
            .map(|m| {
                let website = if self.aggregator {
                    format!("https://portalautarquico.dgal.gov.pt/m/{}", m.id)
                } else {
                    format!("https://{}.example.pt/", m.id)
                };
                (m.id.clone(), MunicipalitySite::new(m, website))
            })
            .collect())
    }
}

struct Counting(Arc<AtomicUsize>);

#[async_trait]
impl SiteResolverStrategy for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn resolve(&self, _ctx: &ResolveContext<'_>) -> Result<SiteMap> {
        self.0.fetch_add(1, Ordering::SeqCst);
        bail!("should only run while sites are missing")
    }
}

#[tokio::test]
async fn later_tiers_run_only_while_own_sites_are_missing() {
    let catalog = SourceCatalog::standard();
    let settings = IngestSettings::without_delays();
    let fetcher = FixtureFetcher::new();
    let ctx = ResolveContext {
        fetcher: &fetcher,
        catalog: &catalog,
        settings: &settings,
        index_source: catalog.source(PORTAL_AUTARQUICO).unwrap(),
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let complete = MunicipalSiteResolver::new(vec![
        Box::new(Everything { aggregator: false }),
        Box::new(Counting(calls.clone())),
    ]);
    let sites = complete.resolve(&ctx).await;
    assert_eq!(sites.len(), catalog.municipalities().len());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // aggregator pages do not count as resolved; the failing tier is skipped
    let aggregated = MunicipalSiteResolver::new(vec![
        Box::new(Everything { aggregator: true }),
        Box::new(Counting(calls.clone())),
    ]);
    let sites = aggregated.resolve(&ctx).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sites.len(), catalog.municipalities().len());
    assert!(sites
        .values()
        .all(|s| s.website.starts_with("https://portalautarquico.dgal.gov.pt/")));
}

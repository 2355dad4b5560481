// tests/canonical_e2e.rs
//
// Fundo Ambiental end to end: listing → relevance filter → detail pages →
// persistence, through the standard orchestrator with saved pages.

use std::sync::Arc;

use subsidy_ingest::ingest::config::IngestSettings;
use subsidy_ingest::ingest::fetch::FixtureFetcher;
use subsidy_ingest::ingest::types::{ProgramStatus, ProgramType, SourceType};
use subsidy_ingest::standard_orchestrator;
use subsidy_ingest::store::{MemoryStore, ProgramStore};

const LISTING_URL: &str = "https://www.fundoambiental.pt/avisos";
const VALE_URL: &str = "https://www.fundoambiental.pt/avisos/vale-eficiencia";
const EDIFICIOS_URL: &str = "https://www.fundoambiental.pt/avisos/edificios-sustentaveis";

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn fetcher() -> FixtureFetcher {
    FixtureFetcher::new()
        .with_page(LISTING_URL, fixture("fa_avisos.html"))
        .with_page(VALE_URL, fixture("fa_vale_eficiencia.html"))
}

#[tokio::test]
async fn fundo_ambiental_run_persists_enriched_programs_once() {
    let fetcher = Arc::new(fetcher());
    let store = Arc::new(MemoryStore::new());
    let orch = standard_orchestrator(
        IngestSettings::without_delays(),
        fetcher.clone(),
        store.clone(),
    );

    let results = orch.run("fundo-ambiental").await.expect("known source");
    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.stats.found, 2);
    assert_eq!(r.stats.new, 2);
    assert_eq!(r.stats.errors, 0);

    // the mobility notice is never fetched: it was dropped before deep crawl
    let requested = fetcher.requested();
    assert!(requested.contains(&VALE_URL.to_string()));
    assert!(requested.contains(&EDIFICIOS_URL.to_string()));
    assert!(!requested.iter().any(|u| u.ends_with("/mobilidade")));

    let vale = store
        .program_by_slug("fundo-ambiental-aviso-de-candidaturas-vale-eficiencia")
        .await
        .unwrap()
        .expect("vale eficiencia persisted");
    assert_eq!(vale.title, "Aviso de candidaturas Vale Eficiência");
    assert_eq!(vale.entity, "Fundo Ambiental");
    assert_eq!(vale.program_type, ProgramType::National);
    assert_eq!(vale.status, ProgramStatus::Open);
    assert_eq!(vale.official_url, VALE_URL);
    // the listing blurb is kept over the page's own summary
    assert!(vale.summary.as_deref().unwrap().contains("Apoio à eficiência energética"));

    let sources = store.sources_for(vale.id).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].source_type, SourceType::Fa);
    let payload = &sources[0].raw_payload;
    assert_eq!(payload["sourceId"], "fundo-ambiental");
    assert_eq!(payload["category"], "JANELAS");
    assert_eq!(
        payload["applicationUrl"],
        "https://apoios.fundoambiental.pt/candidatura/vale"
    );
    assert_eq!(payload["requiredDocuments"].as_array().unwrap().len(), 3);
    assert_eq!(payload["deadlineDate"], "2025-12-31");
    assert!(payload["howToApply"]
        .as_str()
        .unwrap()
        .starts_with("As candidaturas são submetidas"));

    // the second detail page is unreachable: stored from the listing alone
    let programs = store.list_programs().await.unwrap();
    assert_eq!(programs.len(), 2);
    let edificios = programs
        .iter()
        .find(|p| p.official_url == EDIFICIOS_URL)
        .expect("edificios persisted");
    let payload = &store.sources_for(edificios.id).await.unwrap()[0].raw_payload;
    assert!(payload.get("howToApply").is_none());

    // unchanged pages on the next run change nothing
    let again = orch.run("fundo-ambiental").await.unwrap();
    assert_eq!(again[0].stats.found, 2);
    assert_eq!(again[0].stats.new, 0);
    assert_eq!(again[0].stats.skipped, 2);
    assert_eq!(store.versions(vale.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn boilerplate_detail_pages_are_skipped() {
    let fetcher = fetcher().with_page(
        EDIFICIOS_URL,
        "<html><head><title>Contactos</title></head><body><h1>Contactos</h1></body></html>",
    );
    let store = Arc::new(MemoryStore::new());
    let orch = standard_orchestrator(
        IngestSettings::without_delays(),
        Arc::new(fetcher),
        store.clone(),
    );

    let results = orch.run("fundo-ambiental").await.unwrap();
    assert_eq!(results[0].stats.found, 2);
    assert_eq!(results[0].stats.new, 1);
    assert_eq!(results[0].stats.skipped, 1);

    let programs = store.list_programs().await.unwrap();
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].official_url, VALE_URL);
}

#[tokio::test]
async fn unreachable_seeds_are_a_successful_empty_run() {
    let store = Arc::new(MemoryStore::new());
    let orch = standard_orchestrator(
        IngestSettings::without_delays(),
        Arc::new(FixtureFetcher::new()),
        store.clone(),
    );

    let results = orch.run("core-national").await.unwrap();
    assert!(results.len() > 1);
    for r in &results {
        assert!(r.success, "{}: {:?}", r.source, r.error);
        assert_eq!(r.stats.found, 0);
    }
    assert!(store.list_programs().await.unwrap().is_empty());
}

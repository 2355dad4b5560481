// tests/municipal_worker.rs
//
// Municipal coverage run over one resolved municipality: probe pages,
// discovery with municipal context, MUNICIPAL persistence, spacing between
// persisted candidates.

use std::sync::Arc;

use subsidy_ingest::ingest::config::IngestSettings;
use subsidy_ingest::ingest::fetch::FixtureFetcher;
use subsidy_ingest::ingest::types::{ProgramType, SourceType};
use subsidy_ingest::standard_orchestrator;
use subsidy_ingest::store::{GeoLevel, MemoryStore, ProgramStore};

const SITES_CSV: &str = "https://dados.gov.pt/s/resources/municipios/websites.csv";
const BRAGA_HOME: &str = "https://www.cm-braga.pt/";

fn settings(persist_delay_ms: u64) -> IngestSettings {
    IngestSettings {
        municipal_resource_urls: vec![SITES_CSV.into()],
        persist_delay_ms,
        ..IngestSettings::without_delays()
    }
}

fn fetcher() -> FixtureFetcher {
    FixtureFetcher::new()
        .with_page(SITES_CSV, "Município;Website\nBraga;www.cm-braga.pt\n")
        .with_page(
            BRAGA_HOME,
            r#"<html><body><nav><a href="/contactos">Contactos</a></nav>
               <ul>
                 <li><a href="/habitacao/apoio-janelas">Candidaturas ao apoio municipal para janelas eficientes</a></li>
                 <li><a href="/avisos/reabilitacao-2025">Aviso de abertura: apoio à reabilitação de habitação</a></li>
               </ul></body></html>"#,
        )
}

#[tokio::test(start_paused = true)]
async fn resolved_site_programs_are_persisted_as_municipal() {
    let store = Arc::new(MemoryStore::new());
    let orch = standard_orchestrator(settings(40), Arc::new(fetcher()), store.clone());

    let started = tokio::time::Instant::now();
    let results = orch.run("municipios-portugal").await.expect("known source");
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.stats.found, 2);
    assert_eq!(r.stats.new, 2);
    assert_eq!(r.extra["municipalitiesCovered"], 1);
    // one 40ms wait after each persisted candidate
    assert!(elapsed >= std::time::Duration::from_millis(80), "{elapsed:?}");

    let programs = store.list_programs().await.unwrap();
    assert_eq!(programs.len(), 2);
    for p in &programs {
        assert_eq!(p.program_type, ProgramType::Municipal);
        assert_eq!(p.entity, "Câmara Municipal de Braga");
        assert!(p.official_url.starts_with("https://www.cm-braga.pt/"));
        let geos = store.geographies(p.id).await.unwrap();
        assert_eq!(geos[0].level, GeoLevel::Municipality);
        assert_eq!(geos[0].municipality.as_deref(), Some("Braga"));
        assert_eq!(geos[0].district.as_deref(), Some("Braga"));
        let sources = store.sources_for(p.id).await.unwrap();
        assert_eq!(sources[0].source_type, SourceType::MunicipalSite);
    }
}

#[tokio::test]
async fn rerun_without_changes_skips_everything() {
    let store = Arc::new(MemoryStore::new());
    let orch = standard_orchestrator(settings(0), Arc::new(fetcher()), store.clone());

    orch.run("municipios-portugal").await.unwrap();
    let again = orch.run("municipal").await.unwrap();
    assert_eq!(again[0].stats.new, 0);
    assert_eq!(again[0].stats.skipped, 2);
    assert_eq!(store.list_programs().await.unwrap().len(), 2);
}

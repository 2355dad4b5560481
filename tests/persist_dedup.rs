// tests/persist_dedup.rs
//
// Content-hash dedup and persistence, run against both store backends.
//
// Covered:
// - re-persisting an unchanged candidate is a no-op
// - changed content updates the program and appends exactly one version
// - same content under a URL that differs only in case is skipped
// - same content under a different address is a second program
// - colliding titles get `base`, `base-2` slugs
// - municipal overrides set type, entity, geography

use std::sync::Arc;

use subsidy_ingest::ingest::persist::{persist_candidate, PersistOutcome, PersistOverrides};
use subsidy_ingest::ingest::types::{DiscoveredCandidate, ProgramType, SourceType};
use subsidy_ingest::sources::{SourceCatalog, FUNDO_AMBIENTAL, PORTAL_AUTARQUICO};
use subsidy_ingest::store::{GeoLevel, MemoryStore, ProgramStore, SqliteStore};

async fn stores() -> Vec<(&'static str, Arc<dyn ProgramStore>)> {
    let sqlite = SqliteStore::connect("sqlite::memory:")
        .await
        .expect("sqlite in memory");
    vec![
        ("memory", Arc::new(MemoryStore::new())),
        ("sqlite", Arc::new(sqlite)),
    ]
}

fn vale() -> DiscoveredCandidate {
    DiscoveredCandidate {
        description: Some("Candidaturas abertas para janelas eficientes.".into()),
        ..DiscoveredCandidate::new(
            "Aviso de candidaturas Vale Eficiência",
            "https://www.fundoambiental.pt/avisos/vale-eficiencia",
        )
    }
}

#[tokio::test]
async fn unchanged_candidate_is_idempotent() {
    let catalog = SourceCatalog::standard();
    let fa = catalog.source(FUNDO_AMBIENTAL).unwrap();

    for (name, store) in stores().await {
        let store = store.as_ref();
        let none = PersistOverrides::default();
        assert_eq!(persist_candidate(store, fa, &vale(), &none).await.unwrap(), PersistOutcome::New, "{name}");
        assert_eq!(persist_candidate(store, fa, &vale(), &none).await.unwrap(), PersistOutcome::Skipped, "{name}");
        assert_eq!(persist_candidate(store, fa, &vale(), &none).await.unwrap(), PersistOutcome::Skipped, "{name}");

        let programs = store.list_programs().await.unwrap();
        assert_eq!(programs.len(), 1, "{name}");
        let p = &programs[0];
        assert_eq!(p.slug, "fundo-ambiental-aviso-de-candidaturas-vale-eficiencia");
        assert_eq!(p.entity, "Fundo Ambiental");
        assert_eq!(p.program_type, ProgramType::National);
        assert_eq!(store.versions(p.id).await.unwrap().len(), 1, "{name}");

        let sources = store.sources_for(p.id).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_type, SourceType::Fa);
        assert_eq!(sources[0].raw_payload["sourceId"], "fundo-ambiental");

        let geos = store.geographies(p.id).await.unwrap();
        assert_eq!(geos.len(), 1);
        assert_eq!(geos[0].level, GeoLevel::National);
    }
}

#[tokio::test]
async fn changed_content_updates_and_appends_one_version() {
    let catalog = SourceCatalog::standard();
    let fa = catalog.source(FUNDO_AMBIENTAL).unwrap();

    for (name, store) in stores().await {
        let store = store.as_ref();
        let none = PersistOverrides::default();
        persist_candidate(store, fa, &vale(), &none).await.unwrap();

        let mut changed = vale();
        changed.description = Some("Candidaturas encerradas a 31 de março.".into());
        assert_eq!(
            persist_candidate(store, fa, &changed, &none).await.unwrap(),
            PersistOutcome::Updated,
            "{name}"
        );
        // the new content is now the stored one
        assert_eq!(
            persist_candidate(store, fa, &changed, &none).await.unwrap(),
            PersistOutcome::Skipped,
            "{name}"
        );

        let programs = store.list_programs().await.unwrap();
        assert_eq!(programs.len(), 1, "{name}");
        let p = &programs[0];
        assert_eq!(p.summary.as_deref(), changed.description.as_deref());
        assert_eq!(p.status.as_str(), "CLOSED");
        assert_eq!(store.versions(p.id).await.unwrap().len(), 2, "{name}");
        assert_eq!(store.sources_for(p.id).await.unwrap().len(), 1, "{name}");
    }
}

#[tokio::test]
async fn same_content_under_a_case_variant_url_is_skipped() {
    let catalog = SourceCatalog::standard();
    let fa = catalog.source(FUNDO_AMBIENTAL).unwrap();

    for (name, store) in stores().await {
        let store = store.as_ref();
        let none = PersistOverrides::default();
        persist_candidate(store, fa, &vale(), &none).await.unwrap();

        let mut mirror = vale();
        mirror.url = "https://www.fundoambiental.pt/Avisos/Vale-Eficiencia".into();
        assert_eq!(
            persist_candidate(store, fa, &mirror, &none).await.unwrap(),
            PersistOutcome::Skipped,
            "{name}"
        );
        assert_eq!(store.list_programs().await.unwrap().len(), 1, "{name}");
        assert!(store.source_by_url(&mirror.url).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn same_content_under_another_address_is_a_new_program() {
    let catalog = SourceCatalog::standard();
    let fa = catalog.source(FUNDO_AMBIENTAL).unwrap();

    for (name, store) in stores().await {
        let store = store.as_ref();
        let none = PersistOverrides::default();
        persist_candidate(store, fa, &vale(), &none).await.unwrap();

        // the address is hashed with the text
        let mut copy = vale();
        copy.url = "https://www.fundoambiental.pt/noticias/vale-eficiencia".into();
        assert_eq!(
            persist_candidate(store, fa, &copy, &none).await.unwrap(),
            PersistOutcome::New,
            "{name}"
        );

        let programs = store.list_programs().await.unwrap();
        assert_eq!(programs.len(), 2, "{name}");
        assert_eq!(programs[1].slug, "fundo-ambiental-aviso-de-candidaturas-vale-eficiencia-2");
        assert!(store.source_by_url(&copy.url).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn colliding_titles_get_numbered_slugs() {
    let catalog = SourceCatalog::standard();
    let fa = catalog.source(FUNDO_AMBIENTAL).unwrap();

    for (name, store) in stores().await {
        let store = store.as_ref();
        let none = PersistOverrides::default();
        let a = DiscoveredCandidate::new("Vale Eficiência", "https://www.fundoambiental.pt/a");
        let b = DiscoveredCandidate::new("Vale Eficiência", "https://www.fundoambiental.pt/b");
        assert_eq!(persist_candidate(store, fa, &a, &none).await.unwrap(), PersistOutcome::New);
        assert_eq!(persist_candidate(store, fa, &b, &none).await.unwrap(), PersistOutcome::New);

        let slugs: Vec<String> = store
            .list_programs()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.slug)
            .collect();
        assert_eq!(
            slugs,
            vec!["fundo-ambiental-vale-eficiencia", "fundo-ambiental-vale-eficiencia-2"],
            "{name}"
        );
    }
}

#[tokio::test]
async fn municipal_override_sets_entity_and_geography() {
    let catalog = SourceCatalog::standard();
    let index = catalog.source(PORTAL_AUTARQUICO).unwrap();

    for (name, store) in stores().await {
        let store = store.as_ref();
        let cand = DiscoveredCandidate {
            municipality: Some("Braga".into()),
            district: Some("Braga".into()),
            ..DiscoveredCandidate::new(
                "Regulamento de apoio à reabilitação urbana - candidaturas",
                "https://www.cm-braga.pt/habitacao/apoio-reabilitacao",
            )
        };
        let overrides = PersistOverrides {
            program_type: Some(ProgramType::Municipal),
            entity: Some("Câmara Municipal de Braga".into()),
            source_type: Some(SourceType::MunicipalSite),
        };
        assert_eq!(
            persist_candidate(store, index, &cand, &overrides).await.unwrap(),
            PersistOutcome::New
        );

        let p = store
            .program_by_slug("portal-autarquico-dgal-braga-regulamento-de-apoio-a-reabilitacao-urbana-candidaturas")
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{name}: program by slug"));
        assert_eq!(p.entity, "Câmara Municipal de Braga");
        assert_eq!(p.program_type, ProgramType::Municipal);

        let geos = store.geographies(p.id).await.unwrap();
        assert_eq!(geos.len(), 1, "{name}");
        assert_eq!(geos[0].level, GeoLevel::Municipality);
        assert_eq!(geos[0].municipality.as_deref(), Some("Braga"));
        assert_eq!(geos[0].district.as_deref(), Some("Braga"));
        assert_eq!(
            store.sources_for(p.id).await.unwrap()[0].source_type,
            SourceType::MunicipalSite
        );
    }
}

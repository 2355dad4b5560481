// tests/sqlite_store.rs
use chrono::Utc;
use serde_json::json;

use subsidy_ingest::ingest::types::{ProgramStatus, ProgramType, SourceType};
use subsidy_ingest::store::{
    open_store, GeoLevel, NewProgram, NewVersion, ProgramFields, ProgramGeography, ProgramStore,
    SourceFields, SqliteStore,
};

fn new_program(slug: &str, url: &str, hash: &str) -> NewProgram {
    NewProgram {
        slug: slug.into(),
        fields: ProgramFields {
            title: "Programa de apoio à reabilitação".into(),
            summary: None,
            entity: "Câmara Municipal de Évora".into(),
            program_type: ProgramType::Municipal,
            status: ProgramStatus::Unknown,
            official_url: url.into(),
        },
        level: GeoLevel::Municipality,
        municipality: Some("Évora".into()),
        district: Some("Évora".into()),
        source: SourceFields {
            source_type: SourceType::MunicipalSite,
            source_url: url.into(),
            fetched_at: Utc::now(),
            content_hash: hash.into(),
            raw_payload: json!({"sourceId": "municipios-portugal"}),
        },
    }
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("programs.db").display());

    {
        let store = SqliteStore::connect(&url).await.expect("create db");
        let p = store
            .create_program(new_program("evora-reabilitacao", "https://www.cm-evora.pt/r", "h1"))
            .await
            .unwrap();
        store
            .append_version(NewVersion {
                program_id: p.id,
                version_date: Utc::now(),
                raw_text: "{}".into(),
                rules: json!({"source": "municipios-portugal", "programType": "MUNICIPAL"}),
            })
            .await
            .unwrap();
    }

    let store = open_store(Some(&url)).await.expect("reopen");
    let p = store
        .program_by_slug("evora-reabilitacao")
        .await
        .unwrap()
        .expect("persisted program");
    assert_eq!(p.entity, "Câmara Municipal de Évora");
    assert!(p.summary.is_none());
    let versions = store.versions(p.id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].rules["programType"], "MUNICIPAL");
    assert_eq!(store.source_by_hash("h1").await.unwrap().unwrap().program_id, p.id);
}

#[tokio::test]
async fn geography_rows_are_not_duplicated() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let p = store
        .create_program(new_program("evora", "https://www.cm-evora.pt/a", "h"))
        .await
        .unwrap();

    let geo = ProgramGeography {
        program_id: p.id,
        level: GeoLevel::Municipality,
        municipality: Some("Évora".into()),
        district: Some("Évora".into()),
    };
    store.ensure_geography(geo.clone()).await.unwrap();
    store.ensure_geography(geo.clone()).await.unwrap();

    let geos = store.geographies(p.id).await.unwrap();
    assert_eq!(geos, vec![geo]);

    store
        .ensure_geography(ProgramGeography {
            program_id: p.id,
            level: GeoLevel::National,
            municipality: None,
            district: None,
        })
        .await
        .unwrap();
    let geos = store.geographies(p.id).await.unwrap();
    assert_eq!(geos.len(), 2);
    assert!(geos.iter().any(|g| g.level == GeoLevel::National && g.municipality.is_none()));
}

#[tokio::test]
async fn failed_create_leaves_nothing_behind() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    store
        .create_program(new_program("dup", "https://www.cm-evora.pt/a", "h1"))
        .await
        .unwrap();

    // same source url: the source insert fails after the program insert
    let err = store
        .create_program(new_program("other", "https://www.cm-evora.pt/a", "h2"))
        .await;
    assert!(err.is_err());
    assert!(!store.slug_exists("other").await.unwrap());
    assert_eq!(store.list_programs().await.unwrap().len(), 1);

    assert!(store
        .create_program(new_program("dup", "https://www.cm-evora.pt/b", "h3"))
        .await
        .is_err());
}

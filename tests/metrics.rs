// tests/metrics.rs
//
// One test per binary: the Prometheus recorder is process-wide.

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use subsidy_ingest::api::{self, AppState};
use subsidy_ingest::ingest::config::IngestSettings;
use subsidy_ingest::ingest::fetch::FixtureFetcher;
use subsidy_ingest::metrics::Metrics;
use subsidy_ingest::standard_orchestrator;
use subsidy_ingest::store::MemoryStore;

#[tokio::test]
async fn metrics_endpoint_reports_ingest_series() {
    let settings = IngestSettings::without_delays();
    let metrics = Metrics::init(&settings).expect("install recorder");
    assert!(Metrics::init(&settings).is_err(), "second recorder must be refused");

    let fetcher = FixtureFetcher::new().with_page(
        "https://www.fundoambiental.pt/avisos",
        std::fs::read_to_string("tests/fixtures/fa_avisos.html").expect("fixture"),
    );
    let orch = Arc::new(standard_orchestrator(
        settings,
        Arc::new(fetcher),
        Arc::new(MemoryStore::new()),
    ));
    let results = orch.run("fundo-ambiental").await.unwrap();
    assert_eq!(results[0].stats.new, 2);

    let app = api::router(AppState::new(orch)).merge(metrics.router());
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "ingest_candidates_found_total",
        "ingest_programs_new_total 2",
        "ingest_municipal_limit ",
        "ingest_max_candidates_per_source ",
        "ingest_worker_duration_ms_bucket{source=\"fundo-ambiental\"",
        "# HELP ingest_programs_new_total Programs created.",
    ] {
        assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
    }
    assert!(metrics.render().contains("ingest_programs_new_total 2"));
}

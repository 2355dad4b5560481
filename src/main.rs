//! Subsidy ingest service entrypoint.
//! Boots the Axum HTTP server with the ingest orchestrator, the admin and
//! cron triggers, and the Prometheus endpoint.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subsidy_ingest::api::{self, AppState};
use subsidy_ingest::ingest::fetch::HttpFetcher;
use subsidy_ingest::ingest::scheduler::{spawn_scheduler, IngestSchedulerCfg};
use subsidy_ingest::metrics::Metrics;
use subsidy_ingest::store::open_store;
use subsidy_ingest::{standard_orchestrator, IngestSettings};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("subsidy_ingest=info,ingest=info,warn"));
    // shuttle may already have installed a subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // .env is optional
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = IngestSettings::load()?;
    let fetcher = Arc::new(HttpFetcher::new(&settings)?);
    let store = open_store(settings.database_url.as_deref()).await?;
    tracing::info!(
        target: "ingest",
        database = settings.database_url.is_some(),
        municipal_limit = settings.municipal_limit,
        "ingest service starting"
    );

    let metrics = Metrics::init(&settings)?;
    let orchestrator = Arc::new(standard_orchestrator(settings, fetcher, store));

    if let Some(cfg) = IngestSchedulerCfg::from_env() {
        tracing::info!(target: "ingest", interval_secs = cfg.interval_secs, "periodic ingest enabled");
        spawn_scheduler(cfg, orchestrator.clone());
    }

    let router = api::router(AppState::from_env(orchestrator)).merge(metrics.router());
    Ok(router.into())
}

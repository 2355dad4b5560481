// src/metrics.rs
//! Prometheus exposition of the ingest series.

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::ingest::config::IngestSettings;

/// Worker runs range from a missing seed (milliseconds) to a full
/// municipal sweep (tens of minutes).
const WORKER_DURATION_BUCKETS_MS: &[f64] = &[
    50.0, 250.0, 1_000.0, 5_000.0, 15_000.0, 60_000.0, 300_000.0, 900_000.0, 3_600_000.0,
];

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide recorder and describe every ingest series.
    /// Only one recorder can be installed per process.
    pub fn init(settings: &IngestSettings) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("ingest_worker_duration_ms".to_string()),
                WORKER_DURATION_BUCKETS_MS,
            )
            .context("prometheus: worker duration buckets")?
            .install_recorder()
            .context("prometheus: install recorder")?;

        crate::ingest::ensure_metrics_described();
        gauge!("ingest_municipal_limit").set(settings.municipal_limit as f64);
        gauge!("ingest_max_candidates_per_source").set(settings.max_candidates_per_source as f64);

        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// `GET /metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(exposition))
            .with_state(self.handle.clone())
    }
}

async fn exposition(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

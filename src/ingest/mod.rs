// src/ingest/mod.rs
pub mod classify;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod municipal;
pub mod persist;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// Describe every ingest series once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_candidates_found_total",
            "Candidates kept by listing-page discovery."
        );
        describe_counter!(
            "ingest_fetch_failures_total",
            "Pages that could not be fetched after all attempts."
        );
        describe_counter!("ingest_programs_new_total", "Programs created.");
        describe_counter!(
            "ingest_programs_updated_total",
            "Programs whose source content changed."
        );
        describe_counter!(
            "ingest_programs_skipped_total",
            "Candidates with no change or already known by content."
        );
        describe_counter!(
            "ingest_candidate_errors_total",
            "Candidates that failed to persist."
        );
        describe_counter!(
            "ingest_worker_failures_total",
            "Worker runs that failed or panicked."
        );
        describe_histogram!(
            "ingest_worker_duration_ms",
            "Wall time of one worker run in milliseconds."
        );
        describe_counter!("ingest_runs_total", "Scheduled ingest runs completed.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the scheduled ingest last ran."
        );
    });
}

// src/ingest/scheduler.rs
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::workers::registry::{Orchestrator, GROUP_ALL};
use crate::workers::result::TotalStats;

pub const ENV_SCHEDULE_SECS: &str = "INGEST_SCHEDULE_SECS";

#[derive(Clone, Debug)]
pub struct IngestSchedulerCfg {
    pub interval_secs: u64,
    pub source: String,
}

impl IngestSchedulerCfg {
    /// `INGEST_SCHEDULE_SECS` > 0 enables the periodic run of every source.
    pub fn from_env() -> Option<Self> {
        let secs = std::env::var(ENV_SCHEDULE_SECS)
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|s| *s > 0)?;
        Some(Self {
            interval_secs: secs,
            source: GROUP_ALL.to_string(),
        })
    }
}

/// Spawn a periodic trigger. Overlapping ticks queue on the orchestrator's
/// run lock; the first tick fires after one full interval.
pub fn spawn_scheduler(cfg: IngestSchedulerCfg, orchestrator: Arc<Orchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp().max(0);
            match orchestrator.run(&cfg.source).await {
                Ok(results) => {
                    let totals = TotalStats::sum(&results);
                    counter!("ingest_runs_total").increment(1);
                    gauge!("ingest_pipeline_last_run_ts").set(now as f64);
                    tracing::info!(
                        target: "ingest",
                        source = %cfg.source,
                        found = totals.found,
                        new = totals.new,
                        updated = totals.updated,
                        skipped = totals.skipped,
                        errors = totals.errors,
                        "scheduled ingest tick"
                    );
                }
                Err(e) => {
                    tracing::error!(target: "ingest", error = %e, "scheduled ingest rejected");
                }
            }
        }
    })
}

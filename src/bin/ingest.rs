//! One-shot ingest run from the command line.
//!
//! ```text
//! ingest                      # every source, in-memory store
//! ingest core-nacional        # a group or a single source id
//! ingest --status             # list runnable sources
//! ingest fundo-ambiental --database sqlite://programs.db
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subsidy_ingest::ingest::fetch::HttpFetcher;
use subsidy_ingest::store::open_store;
use subsidy_ingest::workers::TotalStats;
use subsidy_ingest::{standard_orchestrator, IngestSettings};

#[derive(Debug, Parser)]
#[command(name = "ingest", about = "Discover and persist subsidy programs")]
struct Cli {
    /// Source id or group (`all`, `core-national`, `municipal`, ...).
    #[arg(default_value = "all")]
    source: String,

    /// List available sources and exit.
    #[arg(long)]
    status: bool,

    /// SQLite URL; overrides INGEST_DATABASE_URL. In-memory store when absent.
    #[arg(long)]
    database: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("subsidy_ingest=info,ingest=info,warn"));
    let json = std::env::var("INGEST_LOG_JSON").is_ok_and(|v| v == "1");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut settings = IngestSettings::load()?;
    if let Some(url) = cli.database {
        settings.database_url = Some(url);
    }
    let fetcher = Arc::new(HttpFetcher::new(&settings).context("building http client")?);
    let store = open_store(settings.database_url.as_deref()).await?;
    let orchestrator = standard_orchestrator(settings, fetcher, store);

    if cli.status {
        let sources = orchestrator.available_sources();
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(true);
    }

    let results = orchestrator.run(&cli.source).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    for r in &results {
        eprintln!(
            "{:<28} {:<4} found={} new={} updated={} skipped={} errors={} ({}s)",
            r.source,
            if r.success { "ok" } else { "FAIL" },
            r.stats.found,
            r.stats.new,
            r.stats.updated,
            r.stats.skipped,
            r.stats.errors,
            r.stats.duration
        );
    }
    let totals = TotalStats::sum(&results);
    eprintln!(
        "total: found={} new={} updated={} skipped={} errors={}",
        totals.found, totals.new, totals.updated, totals.skipped, totals.errors
    );
    Ok(results.iter().all(|r| r.success))
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = ?e, "ingest failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

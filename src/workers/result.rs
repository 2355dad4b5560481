// src/workers/result.rs
//! Run result contract shared by every worker and trigger surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::ingest::persist::PersistOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub found: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Seconds, two decimals.
    pub duration: String,
}

impl IngestStats {
    /// Zeroed stats of a worker that failed before producing any.
    pub fn failed() -> Self {
        Self {
            errors: 1,
            duration: format_seconds(0.0),
            ..Default::default()
        }
    }
}

/// Aggregated counters across several results (no duration).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalStats {
    pub found: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl TotalStats {
    pub fn sum(results: &[IngestRunResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.found += r.stats.found;
            acc.new += r.stats.new;
            acc.updated += r.stats.updated;
            acc.skipped += r.stats.skipped;
            acc.errors += r.stats.errors;
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub error: String,
}

impl RunError {
    pub fn new(title: Option<&str>, url: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            title: title.map(str::to_string),
            url: url.map(str::to_string),
            error: error.into(),
        }
    }
}

/// One entry of an orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRunResult {
    pub source: String,
    pub success: bool,
    pub stats: IngestStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<RunError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Worker-specific extras (e.g. municipal coverage counters).
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl IngestRunResult {
    pub fn failure(source: &str, error: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            success: false,
            stats: IngestStats::failed(),
            errors: None,
            error: Some(error.into()),
            extra: BTreeMap::new(),
        }
    }
}

/// Number as produced by a worker: integer, float or numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Count {
    /// Non-finite, negative or unparsable values count as zero.
    pub fn value(&self) -> u64 {
        let f = match self {
            Count::Int(n) => return *n,
            Count::Float(f) => *f,
            Count::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        };
        if f.is_finite() && f > 0.0 {
            f as u64
        } else {
            0
        }
    }
}

/// Duration as produced by a worker: preformatted text or seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStats {
    #[serde(default)]
    pub found: Option<Count>,
    #[serde(default)]
    pub new: Option<Count>,
    #[serde(default)]
    pub updated: Option<Count>,
    #[serde(default)]
    pub skipped: Option<Count>,
    #[serde(default)]
    pub errors: Option<Count>,
    #[serde(default)]
    pub duration: Option<DurationValue>,
}

/// Loosely-typed worker output, normalized by the orchestrator into an
/// [`IngestRunResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub stats: Option<RawStats>,
    #[serde(default)]
    pub errors: Option<Vec<RunError>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

pub fn format_seconds(secs: f64) -> String {
    format!("{:.2}", secs)
}

fn count(c: &Option<Count>) -> u64 {
    c.as_ref().map(Count::value).unwrap_or(0)
}

impl WorkerOutput {
    /// Missing success means success; missing counters are 0; missing
    /// duration is `"0.00"`, numeric seconds get two decimals.
    pub fn normalize(self, source: &str) -> IngestRunResult {
        let raw = self.stats.unwrap_or_default();
        let duration = match raw.duration {
            Some(DurationValue::Text(s)) => s,
            Some(DurationValue::Seconds(f)) if f.is_finite() => format_seconds(f),
            _ => format_seconds(0.0),
        };
        IngestRunResult {
            source: source.to_string(),
            success: self.success.unwrap_or(true),
            stats: IngestStats {
                found: count(&raw.found),
                new: count(&raw.new),
                updated: count(&raw.updated),
                skipped: count(&raw.skipped),
                errors: count(&raw.errors),
                duration,
            },
            errors: self.errors,
            error: self.error,
            extra: self.extra,
        }
    }
}

/// Running counters of one worker pass.
#[derive(Debug)]
pub struct RunTally {
    started: Instant,
    pub found: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: Vec<RunError>,
}

impl Default for RunTally {
    fn default() -> Self {
        Self::start()
    }
}

impl RunTally {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            found: 0,
            new: 0,
            updated: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: PersistOutcome) {
        match outcome {
            PersistOutcome::New => self.new += 1,
            PersistOutcome::Updated => self.updated += 1,
            PersistOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn error(&mut self, title: Option<&str>, url: Option<&str>, error: impl Into<String>) {
        metrics::counter!("ingest_candidate_errors_total").increment(1);
        self.errors.push(RunError::new(title, url, error));
    }

    pub fn finish(self) -> WorkerOutput {
        let errors = self.errors.len() as u64;
        WorkerOutput {
            success: Some(true),
            stats: Some(RawStats {
                found: Some(Count::Int(self.found)),
                new: Some(Count::Int(self.new)),
                updated: Some(Count::Int(self.updated)),
                skipped: Some(Count::Int(self.skipped)),
                errors: Some(Count::Int(errors)),
                duration: Some(DurationValue::Seconds(self.started.elapsed().as_secs_f64())),
            }),
            errors: Some(self.errors),
            error: None,
            extra: BTreeMap::new(),
        }
    }
}

// src/store/mod.rs
//! Persistence of programs, their sources, append-only versions and
//! geographic scope. The ingest layer writes through [`ProgramStore`];
//! downstream readers use its read side.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::types::{ProgramStatus, ProgramType, SourceType};

pub type RecordId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeoLevel {
    National,
    Municipality,
}

impl GeoLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoLevel::National => "NATIONAL",
            GeoLevel::Municipality => "MUNICIPALITY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NATIONAL" => Some(GeoLevel::National),
            "MUNICIPALITY" => Some(GeoLevel::Municipality),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRecord {
    pub id: RecordId,
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub entity: String,
    pub program_type: ProgramType,
    pub status: ProgramStatus,
    pub official_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub id: RecordId,
    pub program_id: RecordId,
    pub source_type: SourceType,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
    pub raw_payload: serde_json::Value,
}

/// Append-only snapshot of a program as seen on one ingest pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramVersionRecord {
    pub id: RecordId,
    pub program_id: RecordId,
    pub version_date: DateTime<Utc>,
    pub raw_text: String,
    pub rules: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramGeography {
    pub program_id: RecordId,
    pub level: GeoLevel,
    pub municipality: Option<String>,
    pub district: Option<String>,
}

/// Program fields written on create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramFields {
    pub title: String,
    pub summary: Option<String>,
    pub entity: String,
    pub program_type: ProgramType,
    pub status: ProgramStatus,
    pub official_url: String,
}

/// Source fields written on create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFields {
    pub source_type: SourceType,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
    pub raw_payload: serde_json::Value,
}

/// Everything needed to create a program in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProgram {
    pub slug: String,
    pub fields: ProgramFields,
    pub level: GeoLevel,
    pub municipality: Option<String>,
    pub district: Option<String>,
    pub source: SourceFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub program_id: RecordId,
    pub version_date: DateTime<Utc>,
    pub raw_text: String,
    pub rules: serde_json::Value,
}

#[async_trait]
pub trait ProgramStore: Send + Sync {
    async fn source_by_url(&self, url: &str) -> Result<Option<SourceRecord>>;
    async fn source_by_hash(&self, content_hash: &str) -> Result<Option<SourceRecord>>;
    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Create program, geography and source together; all or nothing.
    async fn create_program(&self, program: NewProgram) -> Result<ProgramRecord>;
    async fn update_program(&self, id: RecordId, fields: ProgramFields) -> Result<()>;
    async fn update_source(&self, id: RecordId, fields: SourceFields) -> Result<()>;
    async fn append_version(&self, version: NewVersion) -> Result<ProgramVersionRecord>;
    /// Insert the geography row unless an identical one exists.
    async fn ensure_geography(&self, geo: ProgramGeography) -> Result<()>;

    async fn program_by_slug(&self, slug: &str) -> Result<Option<ProgramRecord>>;
    async fn list_programs(&self) -> Result<Vec<ProgramRecord>>;
    async fn versions(&self, program_id: RecordId) -> Result<Vec<ProgramVersionRecord>>;
    async fn geographies(&self, program_id: RecordId) -> Result<Vec<ProgramGeography>>;
    async fn sources_for(&self, program_id: RecordId) -> Result<Vec<SourceRecord>>;
}

/// In-memory store by default; SQLite when a database URL is given.
pub async fn open_store(database_url: Option<&str>) -> Result<std::sync::Arc<dyn ProgramStore>> {
    match database_url {
        Some(url) if !url.trim().is_empty() => {
            Ok(std::sync::Arc::new(SqliteStore::connect(url).await?))
        }
        _ => Ok(std::sync::Arc::new(MemoryStore::new())),
    }
}

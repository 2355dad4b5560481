// src/store/sqlite.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use super::{
    GeoLevel, NewProgram, NewVersion, ProgramFields, ProgramGeography, ProgramRecord,
    ProgramStore, ProgramVersionRecord, RecordId, SourceFields, SourceRecord,
};
use crate::ingest::types::{ProgramStatus, ProgramType, SourceType};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS programs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        summary TEXT,
        entity TEXT NOT NULL,
        program_type TEXT NOT NULL,
        status TEXT NOT NULL,
        official_url TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        program_id INTEGER NOT NULL REFERENCES programs(id),
        source_type TEXT NOT NULL,
        source_url TEXT NOT NULL UNIQUE,
        fetched_at TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        raw_payload TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sources_content_hash ON sources(content_hash)",
    r#"
    CREATE TABLE IF NOT EXISTS program_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        program_id INTEGER NOT NULL REFERENCES programs(id),
        version_date TEXT NOT NULL,
        raw_text TEXT NOT NULL,
        rules_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS program_geographies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        program_id INTEGER NOT NULL REFERENCES programs(id),
        level TEXT NOT NULL,
        municipality TEXT NOT NULL DEFAULT '',
        district TEXT NOT NULL DEFAULT '',
        UNIQUE(program_id, level, municipality, district)
    )
    "#,
];

/// SQLite-backed store. Timestamps are RFC 3339 text, JSON columns are
/// serialized text.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) and migrate. `sqlite::memory:` works and
    /// is pinned to a single connection.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {database_url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(if database_url.contains(":memory:") { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("creating schema")?;
        }
        Ok(())
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw}"))?
        .with_timezone(&Utc))
}

fn parse_json(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("bad json column")
}

fn opt_text(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn from_opt_text(v: String) -> Option<String> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn program_from_row(row: &SqliteRow) -> Result<ProgramRecord> {
    let program_type: String = row.try_get("program_type")?;
    let status: String = row.try_get("status")?;
    Ok(ProgramRecord {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        entity: row.try_get("entity")?,
        program_type: ProgramType::parse(&program_type)
            .ok_or_else(|| anyhow!("unknown program type {program_type}"))?,
        status: ProgramStatus::parse(&status),
        official_url: row.try_get("official_url")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn source_from_row(row: &SqliteRow) -> Result<SourceRecord> {
    let source_type: String = row.try_get("source_type")?;
    Ok(SourceRecord {
        id: row.try_get("id")?,
        program_id: row.try_get("program_id")?,
        source_type: SourceType::parse(&source_type)
            .ok_or_else(|| anyhow!("unknown source type {source_type}"))?,
        source_url: row.try_get("source_url")?,
        fetched_at: parse_ts(&row.try_get::<String, _>("fetched_at")?)?,
        content_hash: row.try_get("content_hash")?,
        raw_payload: parse_json(&row.try_get::<String, _>("raw_payload")?)?,
    })
}

fn version_from_row(row: &SqliteRow) -> Result<ProgramVersionRecord> {
    Ok(ProgramVersionRecord {
        id: row.try_get("id")?,
        program_id: row.try_get("program_id")?,
        version_date: parse_ts(&row.try_get::<String, _>("version_date")?)?,
        raw_text: row.try_get("raw_text")?,
        rules: parse_json(&row.try_get::<String, _>("rules_json")?)?,
    })
}

fn geography_from_row(row: &SqliteRow) -> Result<ProgramGeography> {
    let level: String = row.try_get("level")?;
    Ok(ProgramGeography {
        program_id: row.try_get("program_id")?,
        level: GeoLevel::parse(&level).ok_or_else(|| anyhow!("unknown geo level {level}"))?,
        municipality: from_opt_text(row.try_get("municipality")?),
        district: from_opt_text(row.try_get("district")?),
    })
}

const SOURCE_COLUMNS: &str =
    "id, program_id, source_type, source_url, fetched_at, content_hash, raw_payload";
const PROGRAM_COLUMNS: &str = "id, slug, title, summary, entity, program_type, status, \
                               official_url, created_at, updated_at";

#[async_trait]
impl ProgramStore for SqliteStore {
    async fn source_by_url(&self, url: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE source_url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn source_by_hash(&self, content_hash: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE content_hash = ? ORDER BY id LIMIT 1"
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM programs WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    async fn create_program(&self, program: NewProgram) -> Result<ProgramRecord> {
        let now = Utc::now();
        let f = &program.fields;
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO programs
                (slug, title, summary, entity, program_type, status, official_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&program.slug)
        .bind(&f.title)
        .bind(&f.summary)
        .bind(&f.entity)
        .bind(f.program_type.as_str())
        .bind(f.status.as_str())
        .bind(&f.official_url)
        .bind(ts(&now))
        .bind(ts(&now))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("inserting program {}", program.slug))?
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO program_geographies (program_id, level, municipality, district) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(program.level.as_str())
        .bind(opt_text(&program.municipality))
        .bind(opt_text(&program.district))
        .execute(&mut *tx)
        .await?;

        let s = &program.source;
        sqlx::query(
            r#"
            INSERT INTO sources
                (program_id, source_type, source_url, fetched_at, content_hash, raw_payload)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(s.source_type.as_str())
        .bind(&s.source_url)
        .bind(ts(&s.fetched_at))
        .bind(&s.content_hash)
        .bind(s.raw_payload.to_string())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("inserting source {}", s.source_url))?;

        tx.commit().await?;

        Ok(ProgramRecord {
            id,
            slug: program.slug,
            title: program.fields.title,
            summary: program.fields.summary,
            entity: program.fields.entity,
            program_type: program.fields.program_type,
            status: program.fields.status,
            official_url: program.fields.official_url,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_program(&self, id: RecordId, fields: ProgramFields) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE programs
            SET title = ?, summary = ?, entity = ?, program_type = ?, status = ?,
                official_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.summary)
        .bind(&fields.entity)
        .bind(fields.program_type.as_str())
        .bind(fields.status.as_str())
        .bind(&fields.official_url)
        .bind(ts(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("program {id} not found"));
        }
        Ok(())
    }

    async fn update_source(&self, id: RecordId, fields: SourceFields) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE sources
            SET source_type = ?, source_url = ?, fetched_at = ?, content_hash = ?, raw_payload = ?
            WHERE id = ?
            "#,
        )
        .bind(fields.source_type.as_str())
        .bind(&fields.source_url)
        .bind(ts(&fields.fetched_at))
        .bind(&fields.content_hash)
        .bind(fields.raw_payload.to_string())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("source {id} not found"));
        }
        Ok(())
    }

    async fn append_version(&self, version: NewVersion) -> Result<ProgramVersionRecord> {
        let id = sqlx::query(
            "INSERT INTO program_versions (program_id, version_date, raw_text, rules_json) VALUES (?, ?, ?, ?)",
        )
        .bind(version.program_id)
        .bind(ts(&version.version_date))
        .bind(&version.raw_text)
        .bind(version.rules.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("appending version for program {}", version.program_id))?
        .last_insert_rowid();
        Ok(ProgramVersionRecord {
            id,
            program_id: version.program_id,
            version_date: version.version_date,
            raw_text: version.raw_text,
            rules: version.rules,
        })
    }

    async fn ensure_geography(&self, geo: ProgramGeography) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO program_geographies (program_id, level, municipality, district) VALUES (?, ?, ?, ?)",
        )
        .bind(geo.program_id)
        .bind(geo.level.as_str())
        .bind(opt_text(&geo.municipality))
        .bind(opt_text(&geo.district))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn program_by_slug(&self, slug: &str) -> Result<Option<ProgramRecord>> {
        let row = sqlx::query(&format!("SELECT {PROGRAM_COLUMNS} FROM programs WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(program_from_row).transpose()
    }

    async fn list_programs(&self) -> Result<Vec<ProgramRecord>> {
        let rows = sqlx::query(&format!("SELECT {PROGRAM_COLUMNS} FROM programs ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(program_from_row).collect()
    }

    async fn versions(&self, program_id: RecordId) -> Result<Vec<ProgramVersionRecord>> {
        let rows = sqlx::query(
            "SELECT id, program_id, version_date, raw_text, rules_json FROM program_versions WHERE program_id = ? ORDER BY id",
        )
        .bind(program_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(version_from_row).collect()
    }

    async fn geographies(&self, program_id: RecordId) -> Result<Vec<ProgramGeography>> {
        let rows = sqlx::query(
            "SELECT program_id, level, municipality, district FROM program_geographies WHERE program_id = ? ORDER BY id",
        )
        .bind(program_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(geography_from_row).collect()
    }

    async fn sources_for(&self, program_id: RecordId) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE program_id = ? ORDER BY id"
        ))
        .bind(program_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(source_from_row).collect()
    }
}

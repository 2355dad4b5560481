// src/store/memory.rs
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

use super::{
    NewProgram, NewVersion, ProgramFields, ProgramGeography, ProgramRecord, ProgramStore,
    ProgramVersionRecord, RecordId, SourceFields, SourceRecord,
};

#[derive(Default)]
struct Tables {
    next_id: RecordId,
    programs: Vec<ProgramRecord>,
    sources: Vec<SourceRecord>,
    versions: Vec<ProgramVersionRecord>,
    geographies: Vec<ProgramGeography>,
}

impl Tables {
    fn next_id(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store for tests and dry runs. Enforces the same uniqueness
/// rules as the SQL schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl ProgramStore for MemoryStore {
    async fn source_by_url(&self, url: &str) -> Result<Option<SourceRecord>> {
        let t = self.lock()?;
        Ok(t.sources.iter().find(|s| s.source_url == url).cloned())
    }

    async fn source_by_hash(&self, content_hash: &str) -> Result<Option<SourceRecord>> {
        let t = self.lock()?;
        Ok(t.sources
            .iter()
            .find(|s| s.content_hash == content_hash)
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let t = self.lock()?;
        Ok(t.programs.iter().any(|p| p.slug == slug))
    }

    async fn create_program(&self, program: NewProgram) -> Result<ProgramRecord> {
        let mut t = self.lock()?;
        if t.programs.iter().any(|p| p.slug == program.slug) {
            bail!("slug already exists: {}", program.slug);
        }
        if t
            .sources
            .iter()
            .any(|s| s.source_url == program.source.source_url)
        {
            bail!("source url already exists: {}", program.source.source_url);
        }

        let now = Utc::now();
        let id = t.next_id();
        let f = program.fields;
        let record = ProgramRecord {
            id,
            slug: program.slug,
            title: f.title,
            summary: f.summary,
            entity: f.entity,
            program_type: f.program_type,
            status: f.status,
            official_url: f.official_url,
            created_at: now,
            updated_at: now,
        };
        t.programs.push(record.clone());
        t.geographies.push(ProgramGeography {
            program_id: id,
            level: program.level,
            municipality: program.municipality,
            district: program.district,
        });
        let source_id = t.next_id();
        let s = program.source;
        t.sources.push(SourceRecord {
            id: source_id,
            program_id: id,
            source_type: s.source_type,
            source_url: s.source_url,
            fetched_at: s.fetched_at,
            content_hash: s.content_hash,
            raw_payload: s.raw_payload,
        });
        Ok(record)
    }

    async fn update_program(&self, id: RecordId, fields: ProgramFields) -> Result<()> {
        let mut t = self.lock()?;
        let p = t
            .programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow!("program {id} not found"))?;
        p.title = fields.title;
        p.summary = fields.summary;
        p.entity = fields.entity;
        p.program_type = fields.program_type;
        p.status = fields.status;
        p.official_url = fields.official_url;
        p.updated_at = Utc::now();
        Ok(())
    }

    async fn update_source(&self, id: RecordId, fields: SourceFields) -> Result<()> {
        let mut t = self.lock()?;
        if t
            .sources
            .iter()
            .any(|s| s.id != id && s.source_url == fields.source_url)
        {
            bail!("source url already exists: {}", fields.source_url);
        }
        let s = t
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("source {id} not found"))?;
        s.source_type = fields.source_type;
        s.source_url = fields.source_url;
        s.fetched_at = fields.fetched_at;
        s.content_hash = fields.content_hash;
        s.raw_payload = fields.raw_payload;
        Ok(())
    }

    async fn append_version(&self, version: NewVersion) -> Result<ProgramVersionRecord> {
        let mut t = self.lock()?;
        if !t.programs.iter().any(|p| p.id == version.program_id) {
            bail!("program {} not found", version.program_id);
        }
        let id = t.next_id();
        let record = ProgramVersionRecord {
            id,
            program_id: version.program_id,
            version_date: version.version_date,
            raw_text: version.raw_text,
            rules: version.rules,
        };
        t.versions.push(record.clone());
        Ok(record)
    }

    async fn ensure_geography(&self, geo: ProgramGeography) -> Result<()> {
        let mut t = self.lock()?;
        if !t.geographies.contains(&geo) {
            t.geographies.push(geo);
        }
        Ok(())
    }

    async fn program_by_slug(&self, slug: &str) -> Result<Option<ProgramRecord>> {
        let t = self.lock()?;
        Ok(t.programs.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list_programs(&self) -> Result<Vec<ProgramRecord>> {
        Ok(self.lock()?.programs.clone())
    }

    async fn versions(&self, program_id: RecordId) -> Result<Vec<ProgramVersionRecord>> {
        let t = self.lock()?;
        Ok(t.versions
            .iter()
            .filter(|v| v.program_id == program_id)
            .cloned()
            .collect())
    }

    async fn geographies(&self, program_id: RecordId) -> Result<Vec<ProgramGeography>> {
        let t = self.lock()?;
        Ok(t.geographies
            .iter()
            .filter(|g| g.program_id == program_id)
            .cloned()
            .collect())
    }

    async fn sources_for(&self, program_id: RecordId) -> Result<Vec<SourceRecord>> {
        let t = self.lock()?;
        Ok(t.sources
            .iter()
            .filter(|s| s.program_id == program_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{ProgramStatus, ProgramType, SourceType};
    use crate::store::GeoLevel;

    fn new_program(slug: &str, url: &str) -> NewProgram {
        NewProgram {
            slug: slug.into(),
            fields: ProgramFields {
                title: "Vale Eficiência".into(),
                summary: None,
                entity: "Fundo Ambiental".into(),
                program_type: ProgramType::National,
                status: ProgramStatus::Open,
                official_url: url.into(),
            },
            level: GeoLevel::National,
            municipality: None,
            district: None,
            source: SourceFields {
                source_type: SourceType::Fa,
                source_url: url.into(),
                fetched_at: Utc::now(),
                content_hash: "h1".into(),
                raw_payload: serde_json::json!({}),
            },
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_slug_and_url() {
        let store = MemoryStore::new();
        store
            .create_program(new_program("vale", "https://a.pt/1"))
            .await
            .unwrap();
        assert!(store
            .create_program(new_program("vale", "https://a.pt/2"))
            .await
            .is_err());
        assert!(store
            .create_program(new_program("vale-2", "https://a.pt/1"))
            .await
            .is_err());
        assert_eq!(store.list_programs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn geography_is_not_duplicated() {
        let store = MemoryStore::new();
        let p = store
            .create_program(new_program("vale", "https://a.pt/1"))
            .await
            .unwrap();
        let geo = ProgramGeography {
            program_id: p.id,
            level: GeoLevel::Municipality,
            municipality: Some("Braga".into()),
            district: Some("Braga".into()),
        };
        store.ensure_geography(geo.clone()).await.unwrap();
        store.ensure_geography(geo).await.unwrap();
        assert_eq!(store.geographies(p.id).await.unwrap().len(), 2);
    }
}

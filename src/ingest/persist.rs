// src/ingest/persist.rs
//! Content-hash deduplication and persistence of discovered candidates.

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use serde_json::{json, Map, Value};

use crate::ingest::classify::infer_status;
use crate::ingest::types::{DiscoveredCandidate, ProgramStatus, ProgramType, SourceType};
use crate::sources::CanonicalSourceDefinition;
use crate::store::{
    GeoLevel, NewProgram, NewVersion, ProgramFields, ProgramGeography, ProgramStore,
    SourceFields,
};
use crate::text::{normalize_text, sha256_hex, slugify, truncate_chars};

pub const MAX_SUMMARY_CHARS: usize = 3_000;
pub const MAX_SLUG_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    New,
    Updated,
    Skipped,
}

/// Per-call replacements for the source's program type, entity and source
/// type (municipal and legal workers).
#[derive(Debug, Clone, Default)]
pub struct PersistOverrides {
    pub program_type: Option<ProgramType>,
    pub entity: Option<String>,
    pub source_type: Option<SourceType>,
}

/// SHA-256 of the normalized `title description url source municipality`.
pub fn content_hash(source_id: &str, candidate: &DiscoveredCandidate) -> String {
    sha256_hex(&normalize_text(&format!(
        "{} {} {} {} {}",
        candidate.title,
        candidate.description.as_deref().unwrap_or_default(),
        candidate.url,
        source_id,
        candidate.municipality.as_deref().unwrap_or_default(),
    )))
}

/// `slugify(source municipality title)`, capped; `programa-<millis>` when
/// nothing survives.
pub fn slug_base(source_id: &str, candidate: &DiscoveredCandidate) -> String {
    let parts: Vec<&str> = [
        Some(source_id),
        candidate.municipality.as_deref(),
        Some(candidate.title.as_str()),
    ]
    .into_iter()
    .flatten()
    .filter(|p| !p.trim().is_empty())
    .collect();
    let slug = truncate_chars(&slugify(&parts.join(" ")), MAX_SLUG_CHARS);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        format!("programa-{}", Utc::now().timestamp_millis())
    } else {
        slug
    }
}

/// First of `base`, `base-2`, `base-3`, … not taken yet.
pub async fn unique_slug(store: &dyn ProgramStore, base: &str) -> Result<String> {
    if !store.slug_exists(base).await? {
        return Ok(base.to_string());
    }
    let mut n = 2u32;
    loop {
        let slug = format!("{base}-{n}");
        if !store.slug_exists(&slug).await? {
            return Ok(slug);
        }
        n += 1;
    }
}

/// Raw payload stored with the source and in each version: the candidate,
/// its source, and any metadata keys flattened in.
fn build_payload(source: &CanonicalSourceDefinition, candidate: &DiscoveredCandidate) -> Value {
    let mut payload = Map::new();
    payload.insert("sourceId".into(), json!(source.id));
    payload.insert("sourceName".into(), json!(source.name));
    if let Ok(Value::Object(fields)) = serde_json::to_value(candidate) {
        for (k, v) in fields {
            if k != "metadata" && !v.is_null() {
                payload.insert(k, v);
            }
        }
    }
    if let Some(Value::Object(meta)) = &candidate.metadata {
        for (k, v) in meta {
            payload.insert(k.clone(), v.clone());
        }
    }
    Value::Object(payload)
}

fn resolve_status(candidate: &DiscoveredCandidate) -> ProgramStatus {
    match candidate.status {
        Some(s) if s != ProgramStatus::Unknown => s,
        _ => infer_status(&format!(
            "{} {}",
            candidate.title,
            candidate.description.as_deref().unwrap_or_default()
        )),
    }
}

/// Dedup and persist one candidate.
///
/// 1. Same URL with the same content hash → `Skipped`.
/// 2. Same URL, different hash → program and source rewritten, version
///    appended, municipal geography ensured → `Updated`.
/// 3. Unknown URL but hash already stored (same content elsewhere) →
///    `Skipped`.
/// 4. Otherwise program + geography + source created under a unique slug,
///    version appended → `New`.
pub async fn persist_candidate(
    store: &dyn ProgramStore,
    source: &CanonicalSourceDefinition,
    candidate: &DiscoveredCandidate,
    overrides: &PersistOverrides,
) -> Result<PersistOutcome> {
    let program_type = overrides.program_type.unwrap_or(source.program_type);
    let entity = overrides
        .entity
        .clone()
        .unwrap_or_else(|| source.entity.to_string());
    let source_type = overrides.source_type.unwrap_or(source.source_type);
    let hash = content_hash(source.id, candidate);
    let status = resolve_status(candidate);
    let now = Utc::now();

    let existing = store
        .source_by_url(&candidate.url)
        .await
        .context("looking up source by url")?;

    if existing.as_ref().is_some_and(|s| s.content_hash == hash) {
        counter!("ingest_programs_skipped_total").increment(1);
        return Ok(PersistOutcome::Skipped);
    }

    let payload = build_payload(source, candidate);
    let fields = ProgramFields {
        title: candidate.title.clone(),
        summary: candidate
            .description
            .as_deref()
            .map(|d| truncate_chars(d, MAX_SUMMARY_CHARS)),
        entity,
        program_type,
        status,
        official_url: candidate.url.clone(),
    };
    let source_fields = SourceFields {
        source_type,
        source_url: candidate.url.clone(),
        fetched_at: now,
        content_hash: hash.clone(),
        raw_payload: payload.clone(),
    };
    let version_rules = json!({ "source": source.id, "programType": program_type });

    if let Some(existing) = existing {
        store
            .update_program(existing.program_id, fields)
            .await
            .context("updating program")?;
        store
            .update_source(existing.id, source_fields)
            .await
            .context("updating source")?;
        store
            .append_version(NewVersion {
                program_id: existing.program_id,
                version_date: now,
                raw_text: payload.to_string(),
                rules: version_rules,
            })
            .await?;
        if program_type == ProgramType::Municipal {
            store
                .ensure_geography(ProgramGeography {
                    program_id: existing.program_id,
                    level: GeoLevel::Municipality,
                    municipality: candidate.municipality.clone(),
                    district: candidate.district.clone(),
                })
                .await?;
        }
        counter!("ingest_programs_updated_total").increment(1);
        tracing::debug!(target: "ingest", source = source.id, url = %candidate.url, "program updated");
        return Ok(PersistOutcome::Updated);
    }

    if store
        .source_by_hash(&hash)
        .await
        .context("looking up source by hash")?
        .is_some()
    {
        counter!("ingest_programs_skipped_total").increment(1);
        return Ok(PersistOutcome::Skipped);
    }

    let slug = unique_slug(store, &slug_base(source.id, candidate)).await?;
    let (level, municipality, district) = match program_type {
        ProgramType::Municipal => (
            GeoLevel::Municipality,
            candidate.municipality.clone(),
            candidate.district.clone(),
        ),
        ProgramType::National => (GeoLevel::National, None, None),
    };
    let created = store
        .create_program(NewProgram {
            slug,
            fields,
            level,
            municipality,
            district,
            source: source_fields,
        })
        .await
        .context("creating program")?;
    store
        .append_version(NewVersion {
            program_id: created.id,
            version_date: now,
            raw_text: payload.to_string(),
            rules: version_rules,
        })
        .await?;

    counter!("ingest_programs_new_total").increment(1);
    tracing::info!(
        target: "ingest",
        source = source.id,
        title = %candidate.title,
        slug = %created.slug,
        program_id = created.id,
        "program discovered and created"
    );
    Ok(PersistOutcome::New)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceCatalog;

    #[test]
    fn hash_ignores_case_accents_and_spacing() {
        let mut a = DiscoveredCandidate::new("Vale Eficiência", "https://fa.pt/v");
        a.description = Some("Candidaturas  abertas".into());
        let mut b = DiscoveredCandidate::new("vale eficiencia", "https://fa.pt/v");
        b.description = Some("CANDIDATURAS abertas".into());
        assert_eq!(content_hash("fundo-ambiental", &a), content_hash("fundo-ambiental", &b));
        assert_ne!(content_hash("fundo-ambiental", &a), content_hash("portugal-2030", &a));
    }

    #[test]
    fn slug_includes_source_and_municipality() {
        let mut c = DiscoveredCandidate::new("Apoio à Reabilitação Urbana!", "https://cm.pt/a");
        c.municipality = Some("Vila Nova de Gaia".into());
        assert_eq!(
            slug_base("municipios-portugal", &c),
            "municipios-portugal-vila-nova-de-gaia-apoio-a-reabilitacao-urbana"
        );
        let long = DiscoveredCandidate::new("x".repeat(300), "https://a.pt");
        assert!(slug_base("fa", &long).chars().count() <= MAX_SLUG_CHARS);
    }

    #[test]
    fn payload_flattens_metadata_and_names_the_source() {
        let catalog = SourceCatalog::standard();
        let source = catalog.source("fundo-ambiental").unwrap();
        let mut c = DiscoveredCandidate::new("Vale Eficiência 2025", "https://fa.pt/v");
        c.metadata = Some(json!({"discoveredFrom": "https://fa.pt/"}));
        let p = build_payload(source, &c);
        assert_eq!(p["sourceId"], "fundo-ambiental");
        assert_eq!(p["discoveredFrom"], "https://fa.pt/");
        assert_eq!(p["title"], "Vale Eficiência 2025");
        assert!(p.get("metadata").is_none());
    }

    #[test]
    fn extractor_status_wins_over_inference() {
        let mut c = DiscoveredCandidate::new("Candidaturas abertas", "https://a.pt");
        assert_eq!(resolve_status(&c), ProgramStatus::Open);
        c.status = Some(ProgramStatus::Closed);
        assert_eq!(resolve_status(&c), ProgramStatus::Closed);
    }
}

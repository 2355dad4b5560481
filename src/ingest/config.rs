// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::municipal::HostPreference;
use crate::ingest::types::SupportCategory;

const ENV_PATH: &str = "INGEST_CONFIG_PATH";
const DEFAULT_TOML_PATH: &str = "config/ingest.toml";
const DEFAULT_JSON_PATH: &str = "config/ingest.json";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; PortalCasaEficienteBot/1.0; +https://portalcasaeficiente.pt)";
pub const DEFAULT_MUNICIPAL_DATASET_URL: &str =
    "https://dados.gov.pt/pt/datasets/r/03c535e3-3c1b-47b7-8d6f-7abc9f5ef75a";
pub const DEFAULT_MUNICIPAL_RESOURCE_URL: &str = "https://dados.gov.pt/s/resources/municipios-portugueses-websites-e-historico-de-versoes-no-arquivo-pt/20251029-144102/listagem-dos-municipios-portugueses-websites-e-historico-de-versoes-no-arquivo-pt-revisao-2025.csv";
pub const DEFAULT_MUNICIPAL_CATALOG_URL: &str =
    "https://dados.gov.pt/api/1/datasets/municipios-portugueses-websites-e-historico-de-versoes-no-arquivo-pt/";

fn default_precedence() -> Vec<SupportCategory> {
    SupportCategory::CLASSIFIABLE.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Tie-break order when two categories score the same.
    pub precedence: Vec<SupportCategory>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            precedence: default_precedence(),
        }
    }
}

/// Every tunable of a run. Defaults, then the config file, then env.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub user_agent: String,
    pub http_timeout_ms: u64,
    pub fetch_attempts: u32,
    /// Linear backoff unit: attempt N waits N × this.
    pub fetch_backoff_ms: u64,

    pub seed_delay_ms: u64,
    /// Wait after each persisted candidate, in every worker.
    pub persist_delay_ms: u64,
    pub deep_crawl_delay_ms: u64,
    pub max_candidates_per_source: usize,

    pub municipal_limit: usize,
    pub municipal_request_delay_ms: u64,
    pub municipal_path_limit: usize,
    pub municipal_csv_timeout_ms: u64,
    pub municipal_resource_urls: Vec<String>,
    pub municipal_catalog_url: String,

    /// Spacing between legal search pages.
    pub legal_search_delay_ms: u64,
    /// Spacing between legal persistence attempts.
    pub legal_request_delay_ms: u64,
    pub max_detail_links_per_query: usize,

    pub database_url: Option<String>,

    pub classifier: ClassifierSettings,
    pub host_preference: HostPreference,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_ms: 30_000,
            fetch_attempts: 3,
            fetch_backoff_ms: 900,
            seed_delay_ms: 800,
            persist_delay_ms: 180,
            deep_crawl_delay_ms: 500,
            max_candidates_per_source: 250,
            municipal_limit: crate::sources::municipalities::MUNICIPALITY_COUNT,
            municipal_request_delay_ms: 500,
            municipal_path_limit: crate::sources::keywords::MUNICIPAL_DISCOVERY_PATHS.len(),
            municipal_csv_timeout_ms: 45_000,
            municipal_resource_urls: vec![
                DEFAULT_MUNICIPAL_DATASET_URL.to_string(),
                DEFAULT_MUNICIPAL_RESOURCE_URL.to_string(),
            ],
            municipal_catalog_url: DEFAULT_MUNICIPAL_CATALOG_URL.to_string(),
            legal_search_delay_ms: 900,
            legal_request_delay_ms: 120,
            max_detail_links_per_query: 40,
            database_url: None,
            classifier: ClassifierSettings::default(),
            host_preference: HostPreference::default(),
        }
    }
}

impl IngestSettings {
    /// Settings with every delay set to zero. For tests and offline replays.
    pub fn without_delays() -> Self {
        Self {
            fetch_backoff_ms: 0,
            seed_delay_ms: 0,
            persist_delay_ms: 0,
            deep_crawl_delay_ms: 0,
            municipal_request_delay_ms: 0,
            legal_search_delay_ms: 0,
            legal_request_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    /// 3) config/ingest.json
    /// 4) built-in defaults
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var(ENV_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("INGEST_CONFIG_PATH points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
                let json_p = PathBuf::from(DEFAULT_JSON_PATH);
                if toml_p.exists() {
                    Self::load_from(&toml_p)?
                } else if json_p.exists() {
                    Self::load_from(&json_p)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|k| std::env::var(k).ok());
        Ok(settings)
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut settings: Self = if ext == "json" {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        };
        settings.sanitize();
        Ok(settings)
    }

    /// Apply the documented environment knobs. Unparsable or non-positive
    /// values keep the current value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let positive = |key: &str| -> Option<u64> {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
        };

        if let Some(v) = positive("MUNICIPAL_DISCOVERY_LIMIT") {
            self.municipal_limit = v as usize;
        }
        if let Some(v) = positive("MUNICIPAL_REQUEST_DELAY_MS") {
            self.municipal_request_delay_ms = v;
        }
        if let Some(v) = positive("MUNICIPAL_SCAN_PATH_LIMIT") {
            self.municipal_path_limit = v as usize;
        }
        if let Some(v) = positive("INGEST_HTTP_TIMEOUT_MS") {
            self.http_timeout_ms = v;
        }
        if let Some(list) = lookup("MUNICIPAL_WEBSITES_RESOURCE_URLS") {
            let urls = split_list(&list);
            if !urls.is_empty() {
                self.municipal_resource_urls = urls;
            }
        } else if let Some(dataset) = lookup("MUNICIPAL_WEBSITES_DATASET_URL") {
            let dataset = dataset.trim();
            if !dataset.is_empty() {
                if let Some(first) = self.municipal_resource_urls.first_mut() {
                    *first = dataset.to_string();
                } else {
                    self.municipal_resource_urls.push(dataset.to_string());
                }
            }
        }
        if let Some(url) = lookup("MUNICIPAL_WEBSITES_UDATA_DATASET_URL") {
            if !url.trim().is_empty() {
                self.municipal_catalog_url = url.trim().to_string();
            }
        }
        if let Some(db) = lookup("INGEST_DATABASE_URL") {
            if !db.trim().is_empty() {
                self.database_url = Some(db.trim().to_string());
            }
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        let paths = crate::sources::keywords::MUNICIPAL_DISCOVERY_PATHS.len();
        self.municipal_path_limit = self.municipal_path_limit.min(paths);
        if self.fetch_attempts == 0 {
            self.fetch_attempts = 1;
        }
        let mut seen = std::collections::HashSet::new();
        self.classifier.precedence.retain(|c| seen.insert(*c));
        // categories missing from a custom list keep their declaration order
        for c in SupportCategory::CLASSIFIABLE {
            if seen.insert(c) {
                self.classifier.precedence.push(c);
            }
        }
        self.classifier
            .precedence
            .retain(|c| *c != SupportCategory::Outro);
        self.municipal_resource_urls = split_list(&self.municipal_resource_urls.join(","));
    }
}

fn split_list(s: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    s.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(u.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::{env, fs};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_positive_numbers_only() {
        let mut s = IngestSettings::default();
        s.apply_env(lookup_from(&[
            ("MUNICIPAL_DISCOVERY_LIMIT", "12"),
            ("MUNICIPAL_REQUEST_DELAY_MS", "abc"),
            ("MUNICIPAL_SCAN_PATH_LIMIT", "0"),
            ("INGEST_HTTP_TIMEOUT_MS", "5000"),
        ]));
        assert_eq!(s.municipal_limit, 12);
        assert_eq!(s.municipal_request_delay_ms, 500);
        assert_eq!(s.municipal_path_limit, 10);
        assert_eq!(s.http_timeout_ms, 5000);
    }

    #[test]
    fn path_limit_is_capped_to_known_paths() {
        let mut s = IngestSettings::default();
        s.apply_env(lookup_from(&[("MUNICIPAL_SCAN_PATH_LIMIT", "99")]));
        assert_eq!(s.municipal_path_limit, 10);
    }

    #[test]
    fn resource_urls_are_split_and_deduplicated() {
        let mut s = IngestSettings::default();
        s.apply_env(lookup_from(&[(
            "MUNICIPAL_WEBSITES_RESOURCE_URLS",
            " https://a.example/x.csv , ,https://b.example/y.csv,https://a.example/x.csv",
        )]));
        assert_eq!(
            s.municipal_resource_urls,
            vec!["https://a.example/x.csv", "https://b.example/y.csv"]
        );
    }

    #[test]
    fn toml_file_sets_precedence_and_keeps_missing_categories() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("ingest.toml");
        fs::write(
            &p,
            r#"
seed_delay_ms = 10
[classifier]
precedence = ["SOLAR", "JANELAS", "SOLAR"]
"#,
        )
        .unwrap();
        let s = IngestSettings::load_from(&p).unwrap();
        assert_eq!(s.seed_delay_ms, 10);
        assert_eq!(s.persist_delay_ms, 180);
        assert_eq!(s.classifier.precedence.len(), 6);
        assert_eq!(s.classifier.precedence[0], SupportCategory::Solar);
        assert_eq!(s.classifier.precedence[1], SupportCategory::Janelas);
        assert_eq!(s.classifier.precedence[2], SupportCategory::BombasCalor);
    }

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PATH);

        // no files → defaults
        let s = IngestSettings::load().unwrap();
        assert_eq!(s.max_candidates_per_source, 250);

        let p_json = tmp.path().join("custom.json");
        fs::write(&p_json, r#"{"max_candidates_per_source": 7}"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let s2 = IngestSettings::load().unwrap();
        assert_eq!(s2.max_candidates_per_source, 7);

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(IngestSettings::load().is_err());
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}

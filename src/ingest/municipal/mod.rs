// src/ingest/municipal/mod.rs
//! Municipal website resolution: find the official site of each concelho
//! and build the list of pages to probe on it.

pub mod csv;
pub mod resolver;

pub use resolver::{
    CatalogApiStrategy, MunicipalSiteResolver, OfficialIndexStrategy, OpenDataCsvStrategy,
    ResolveContext, SiteResolverStrategy,
};

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use url::Url;

use crate::sources::municipalities::Municipality;
use crate::text::normalize_text;

/// Resolved website of one municipality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipalitySite {
    pub concelho_id: String,
    pub name: String,
    pub district: String,
    pub website: String,
}

impl MunicipalitySite {
    pub fn new(m: &Municipality, website: String) -> Self {
        Self {
            concelho_id: m.id.clone(),
            name: m.name.clone(),
            district: m.district.clone(),
            website,
        }
    }
}

/// Concelho id → site.
pub type SiteMap = BTreeMap<String, MunicipalitySite>;

/// Rule deciding whether a newly found URL replaces the one already known
/// for a municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPreference {
    /// Host substrings marking an aggregator portal rather than the
    /// municipality's own site.
    pub aggregator_hints: Vec<String>,
    /// Among equals, the shorter hostname wins.
    pub prefer_shorter_host: bool,
}

impl Default for HostPreference {
    fn default() -> Self {
        Self {
            aggregator_hints: vec!["portalautarquico".to_string()],
            prefer_shorter_host: true,
        }
    }
}

impl HostPreference {
    pub fn is_aggregator(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.aggregator_hints
            .iter()
            .any(|h| !h.is_empty() && host.contains(&h.to_ascii_lowercase()))
    }

    pub fn is_aggregator_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| self.is_aggregator(h)))
            .unwrap_or(false)
    }

    /// Should `next` replace `current`?
    pub fn prefers(&self, next: &str, current: Option<&str>) -> bool {
        let Some(current) = current else {
            return true;
        };
        let Some(next_host) = Url::parse(next).ok().and_then(|u| u.host_str().map(str::to_string))
        else {
            return false;
        };
        let Some(cur_host) =
            Url::parse(current).ok().and_then(|u| u.host_str().map(str::to_string))
        else {
            return true;
        };

        match (self.is_aggregator(&next_host), self.is_aggregator(&cur_host)) {
            (false, true) => return true,
            (true, false) => return false,
            _ => {}
        }
        self.prefer_shorter_host && next_host.len() < cur_host.len()
    }
}

/// Strip "Câmara Municipal de", "Município de" and "C.M." prefixes and
/// normalize for lookup.
pub fn normalize_municipality_label(label: &str) -> String {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\b(camara municipal (de|da|do)|municipio (de|da|do))\s+|\bc\.m\.\s+").unwrap()
    });
    re.replace_all(&normalize_text(label), "").trim().to_string()
}

/// The aggregator index is served without `www.`.
pub fn normalize_official_seed_url(url: &str) -> String {
    url.replace(
        "://www.portalautarquico.dgal.gov.pt",
        "://portalautarquico.dgal.gov.pt",
    )
}

/// Home page plus the first `path_limit` sub-path hints, resolved against
/// the site root. Order preserved, duplicates dropped.
pub fn build_probe_urls(website: &str, path_limit: usize, hints: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    if seen.insert(website.to_string()) {
        out.push(website.to_string());
    }
    let Ok(base) = Url::parse(website) else {
        return out;
    };
    for path in hints.iter().take(path_limit) {
        if let Ok(u) = base.join(path) {
            let s = u.to_string();
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
    }
    out
}

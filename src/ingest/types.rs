// src/ingest/types.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a program as inferred from page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramStatus {
    Open,
    Closed,
    Planned,
    #[default]
    Unknown,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramStatus::Open => "OPEN",
            ProgramStatus::Closed => "CLOSED",
            ProgramStatus::Planned => "PLANNED",
            ProgramStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => ProgramStatus::Open,
            "CLOSED" => ProgramStatus::Closed,
            "PLANNED" => ProgramStatus::Planned,
            _ => ProgramStatus::Unknown,
        }
    }
}

/// Support categories a program can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportCategory {
    Janelas,
    BombasCalor,
    Isolamento,
    Solar,
    AquecimentoAguas,
    Cobertura,
    Outro,
}

impl SupportCategory {
    /// Classifiable categories in declaration order (excludes `Outro`).
    pub const CLASSIFIABLE: [SupportCategory; 6] = [
        SupportCategory::Janelas,
        SupportCategory::BombasCalor,
        SupportCategory::Isolamento,
        SupportCategory::Solar,
        SupportCategory::AquecimentoAguas,
        SupportCategory::Cobertura,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportCategory::Janelas => "JANELAS",
            SupportCategory::BombasCalor => "BOMBAS_CALOR",
            SupportCategory::Isolamento => "ISOLAMENTO",
            SupportCategory::Solar => "SOLAR",
            SupportCategory::AquecimentoAguas => "AQUECIMENTO_AGUAS",
            SupportCategory::Cobertura => "COBERTURA",
            SupportCategory::Outro => "OUTRO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let up = s.trim().to_ascii_uppercase();
        Self::CLASSIFIABLE
            .into_iter()
            .chain(std::iter::once(SupportCategory::Outro))
            .find(|c| c.as_str() == up)
    }
}

impl fmt::Display for SupportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramType {
    National,
    Municipal,
}

impl ProgramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramType::National => "NATIONAL",
            ProgramType::Municipal => "MUNICIPAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NATIONAL" => Some(ProgramType::National),
            "MUNICIPAL" => Some(ProgramType::Municipal),
            _ => None,
        }
    }
}

/// Provenance kind of a source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Fa,
    Dr,
    MunicipalSite,
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Fa => "FA",
            SourceType::Dr => "DR",
            SourceType::MunicipalSite => "MUNICIPAL_SITE",
            SourceType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FA" => Some(SourceType::Fa),
            "DR" => Some(SourceType::Dr),
            "MUNICIPAL_SITE" => Some(SourceType::MunicipalSite),
            "OTHER" => Some(SourceType::Other),
            _ => None,
        }
    }
}

/// A link found on a listing page that looks like a program, optionally
/// enriched with sections from its detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredCandidate {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    // enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SupportCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_apply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiaries: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legislation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgramStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_sections: BTreeMap<String, String>,
}

impl DiscoveredCandidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Where a discovery pass is running: the municipality/district it belongs
/// to, if any, gets stamped on every candidate.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryContext {
    pub municipality: Option<String>,
    pub district: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_in_screaming_case() {
        let s = serde_json::to_string(&SupportCategory::AquecimentoAguas).unwrap();
        assert_eq!(s, "\"AQUECIMENTO_AGUAS\"");
        let s = serde_json::to_string(&SourceType::MunicipalSite).unwrap();
        assert_eq!(s, "\"MUNICIPAL_SITE\"");
        assert_eq!(ProgramStatus::parse("open"), ProgramStatus::Open);
        assert_eq!(SupportCategory::parse("bombas_calor"), Some(SupportCategory::BombasCalor));
    }

    #[test]
    fn candidate_payload_is_camel_case_and_sparse() {
        let mut c = DiscoveredCandidate::new("Vale Eficiência", "https://example.pt/vale");
        c.how_to_apply = Some("Submeter no balcão".into());
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["howToApply"], "Submeter no balcão");
        assert!(v.get("requiredDocuments").is_none());
        assert!(v.get("municipality").is_none());
    }
}

// src/sources/mod.rs
//! Canonical source registry: the fixed set of official sites crawled by the
//! pipeline, plus the keyword tables and municipality catalog they rely on.
//! Built once into an immutable [`SourceCatalog`] and shared via `Arc`.

pub mod keywords;
pub mod municipalities;

use crate::ingest::types::{ProgramType, SourceType};
use crate::text::normalize_text;
use municipalities::Municipality;
use serde::Serialize;
use std::collections::HashMap;

/// Coverage class of a canonical source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceCoverage {
    National,
    EuFunds,
    Housing,
    EnergyMeta,
    MunicipalIndex,
    LegalBackstop,
}

/// Which keyword table a source filters with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeywordSet {
    Core,
    Energy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSourceDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub entity: &'static str,
    pub description: &'static str,
    pub coverage: SourceCoverage,
    pub source_type: SourceType,
    pub program_type: ProgramType,
    pub seed_urls: Vec<String>,
    pub keywords: Vec<String>,
    pub allowed_hosts: Vec<String>,
    pub require_application_intent: bool,
    pub discovery_path_hints: Vec<String>,
    /// Enrich each candidate from its detail page before persisting.
    pub deep_crawl: bool,
}

struct SourceSeed {
    id: &'static str,
    name: &'static str,
    entity: &'static str,
    description: &'static str,
    coverage: SourceCoverage,
    source_type: SourceType,
    program_type: ProgramType,
    seed_urls: &'static [&'static str],
    keywords: KeywordSet,
    allowed_hosts: &'static [&'static str],
    path_hints: bool,
    deep_crawl: bool,
}

pub const FUNDO_AMBIENTAL: &str = "fundo-ambiental";
pub const PORTAL_AUTARQUICO: &str = "portal-autarquico-dgal";
pub const DIARIO_REPUBLICA: &str = "diario-republica";

/// Canonical national sources, in run order.
pub const NATIONAL_SOURCE_IDS: &[&str] = &[
    "fundo-ambiental",
    "recuperar-portugal",
    "portugal-2030",
    "balcao-dos-fundos",
    "portal-habitacao-ihru",
    "dgeg-apoios-energia",
    "adene-casa-mais",
];

const SOURCE_SEEDS: &[SourceSeed] = &[
    SourceSeed {
        id: "fundo-ambiental",
        name: "Fundo Ambiental",
        entity: "Fundo Ambiental",
        description: "Avisos e candidaturas nacionais de eficiência energética.",
        coverage: SourceCoverage::National,
        source_type: SourceType::Fa,
        program_type: ProgramType::National,
        seed_urls: &[
            "https://www.fundoambiental.pt/avisos",
            "https://www.fundoambiental.pt/candidaturas.aspx",
        ],
        keywords: KeywordSet::Energy,
        allowed_hosts: &["fundoambiental.pt"],
        path_hints: false,
        deep_crawl: true,
    },
    SourceSeed {
        id: "recuperar-portugal",
        name: "Recuperar Portugal (PRR)",
        entity: "Recuperar Portugal",
        description: "Candidaturas PRR e avisos por componente.",
        coverage: SourceCoverage::National,
        source_type: SourceType::Other,
        program_type: ProgramType::National,
        seed_urls: &[
            "https://recuperarportugal.gov.pt/candidaturas/",
            "https://recuperarportugal.gov.pt/candidaturas-prr/",
        ],
        keywords: KeywordSet::Energy,
        allowed_hosts: &["recuperarportugal.gov.pt"],
        path_hints: false,
        deep_crawl: false,
    },
    SourceSeed {
        id: "portugal-2030",
        name: "Portugal 2030",
        entity: "Portugal 2030",
        description: "Avisos e plano anual de avisos dos fundos europeus.",
        coverage: SourceCoverage::EuFunds,
        source_type: SourceType::Other,
        program_type: ProgramType::National,
        seed_urls: &[
            "https://portugal2030.pt/avisos/",
            "https://portugal2030.pt/plano-anual-de-avisos/",
        ],
        keywords: KeywordSet::Energy,
        allowed_hosts: &["portugal2030.pt"],
        path_hints: false,
        deep_crawl: false,
    },
    SourceSeed {
        id: "balcao-dos-fundos",
        name: "Balcão dos Fundos",
        entity: "Balcão dos Fundos",
        description: "Plataforma de submissão e acompanhamento de candidaturas.",
        coverage: SourceCoverage::EuFunds,
        source_type: SourceType::Other,
        program_type: ProgramType::National,
        seed_urls: &[
            "https://balcaofundosue.pt/avisos",
            "https://balcaofundosue.pt/concursos",
        ],
        keywords: KeywordSet::Core,
        allowed_hosts: &["balcaofundosue.pt"],
        path_hints: false,
        deep_crawl: false,
    },
    SourceSeed {
        id: "portal-habitacao-ihru",
        name: "Portal da Habitação / IHRU",
        entity: "IHRU",
        description: "Programas habitacionais como 1.º Direito e Arrendamento Acessível.",
        coverage: SourceCoverage::Housing,
        source_type: SourceType::Other,
        program_type: ProgramType::National,
        seed_urls: &[
            "https://www.portaldahabitacao.pt/programas-e-medidas",
            "https://www.portaldahabitacao.pt/candidaturas",
        ],
        keywords: KeywordSet::Core,
        allowed_hosts: &["portaldahabitacao.pt", "ihru.pt"],
        path_hints: false,
        deep_crawl: false,
    },
    SourceSeed {
        id: "dgeg-apoios-energia",
        name: "DGEG Apoios Energia",
        entity: "DGEG",
        description: "Metaportal de apoios oficiais na área da energia.",
        coverage: SourceCoverage::EnergyMeta,
        source_type: SourceType::Other,
        program_type: ProgramType::National,
        seed_urls: &[
            "https://www.dgeg.gov.pt/pt/areas-setoriais/energia/apoios-na-area-da-energia/",
            "https://www.dgeg.gov.pt/pt/areas-setoriais/energia/apoios-na-area-da-energia/avisos/",
        ],
        keywords: KeywordSet::Energy,
        allowed_hosts: &["dgeg.gov.pt"],
        path_hints: false,
        deep_crawl: false,
    },
    SourceSeed {
        id: "adene-casa-mais",
        name: "ADENE / casA+",
        entity: "ADENE",
        description: "Discovery e normalização de incentivos e soluções de eficiência.",
        coverage: SourceCoverage::EnergyMeta,
        source_type: SourceType::Other,
        program_type: ProgramType::National,
        seed_urls: &["https://www.adene.pt/", "https://casa-mais.pt/"],
        keywords: KeywordSet::Energy,
        allowed_hosts: &["adene.pt", "casa-mais.pt"],
        path_hints: false,
        deep_crawl: false,
    },
    SourceSeed {
        id: PORTAL_AUTARQUICO,
        name: "Portal Autárquico (DGAL)",
        entity: "DGAL",
        description: "Índice oficial dos 308 municípios para discovery municipal.",
        coverage: SourceCoverage::MunicipalIndex,
        source_type: SourceType::MunicipalSite,
        program_type: ProgramType::Municipal,
        seed_urls: &[
            "https://portalautarquico.dgal.gov.pt/pt-PT/municipios/",
            "https://portalautarquico.dgal.gov.pt/",
        ],
        keywords: KeywordSet::Core,
        allowed_hosts: &["portalautarquico.dgal.gov.pt", "dgal.gov.pt"],
        path_hints: true,
        deep_crawl: true,
    },
    SourceSeed {
        id: DIARIO_REPUBLICA,
        name: "Diário da República",
        entity: "Diário da República",
        description: "Backstop legal para regulamentos e avisos oficiais.",
        coverage: SourceCoverage::LegalBackstop,
        source_type: SourceType::Dr,
        program_type: ProgramType::National,
        seed_urls: &["https://dre.pt/web/guest/pesquisa", "https://dre.pt/"],
        keywords: KeywordSet::Core,
        allowed_hosts: &["dre.pt", "diariodarepublica.pt", "files.diariodarepublica.pt"],
        path_hints: false,
        deep_crawl: false,
    },
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Immutable configuration shared by every worker: canonical sources,
/// keyword tables and the municipality catalog.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    sources: Vec<CanonicalSourceDefinition>,
    municipalities: Vec<Municipality>,
    by_name: HashMap<String, usize>,
}

impl SourceCatalog {
    /// The built-in catalog.
    pub fn standard() -> Self {
        let core = keywords::core_keywords();
        let energy = keywords::energy_keywords();
        let sources = SOURCE_SEEDS
            .iter()
            .map(|s| CanonicalSourceDefinition {
                id: s.id,
                name: s.name,
                entity: s.entity,
                description: s.description,
                coverage: s.coverage,
                source_type: s.source_type,
                program_type: s.program_type,
                seed_urls: owned(s.seed_urls),
                keywords: match s.keywords {
                    KeywordSet::Core => core.clone(),
                    KeywordSet::Energy => energy.clone(),
                },
                allowed_hosts: owned(s.allowed_hosts),
                require_application_intent: true,
                discovery_path_hints: if s.path_hints {
                    owned(keywords::MUNICIPAL_DISCOVERY_PATHS)
                } else {
                    Vec::new()
                },
                deep_crawl: s.deep_crawl,
            })
            .collect();
        Self::with_sources(sources, municipalities::all_municipalities())
    }

    /// Build a catalog from explicit parts (tests, custom deployments).
    pub fn with_sources(
        sources: Vec<CanonicalSourceDefinition>,
        municipalities: Vec<Municipality>,
    ) -> Self {
        let by_name = municipalities
            .iter()
            .enumerate()
            .map(|(i, m)| (m.match_key(), i))
            .collect();
        Self {
            sources,
            municipalities,
            by_name,
        }
    }

    pub fn source(&self, id: &str) -> Option<&CanonicalSourceDefinition> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn sources(&self) -> &[CanonicalSourceDefinition] {
        &self.sources
    }

    pub fn municipalities(&self) -> &[Municipality] {
        &self.municipalities
    }

    /// Look up a municipality by a scraped label (accent/case-insensitive).
    pub fn municipality_by_name(&self, label: &str) -> Option<&Municipality> {
        self.by_name
            .get(&normalize_text(label))
            .map(|&i| &self.municipalities[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_lists_all_canonical_sources() {
        let cat = SourceCatalog::standard();
        assert_eq!(cat.sources().len(), 9);
        for id in NATIONAL_SOURCE_IDS {
            let s = cat.source(id).unwrap();
            assert_eq!(s.program_type, ProgramType::National);
            assert!(s.require_application_intent);
            assert!(!s.seed_urls.is_empty());
        }
        let idx = cat.source(PORTAL_AUTARQUICO).unwrap();
        assert_eq!(idx.coverage, SourceCoverage::MunicipalIndex);
        assert_eq!(idx.discovery_path_hints.len(), 10);
        assert_eq!(cat.source(DIARIO_REPUBLICA).unwrap().source_type, SourceType::Dr);
    }

    #[test]
    fn municipality_lookup_ignores_accents_and_case() {
        let cat = SourceCatalog::standard();
        let m = cat.municipality_by_name("  GUIMARAES ").unwrap();
        assert_eq!(m.name, "Guimarães");
        assert_eq!(m.district, "Braga");
        assert!(cat.municipality_by_name("Atlantis").is_none());
    }
}

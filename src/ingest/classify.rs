// src/ingest/classify.rs
//! Support-category classification, status inference and title filters.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::types::{ProgramStatus, SupportCategory};
use crate::sources::keywords::{CATEGORY_KEYWORDS, GENERIC_RELEVANCE_TERMS};
use crate::text::normalize_text;

/// Keyword-count classifier with an explicit tie-break order.
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    tables: Vec<(SupportCategory, Vec<String>)>,
    precedence: Vec<SupportCategory>,
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new(SupportCategory::CLASSIFIABLE.to_vec())
    }
}

impl CategoryClassifier {
    /// Build over the built-in keyword tables. `precedence` decides ties:
    /// earlier wins. Categories absent from it rank after those listed.
    pub fn new(precedence: Vec<SupportCategory>) -> Self {
        let tables = CATEGORY_KEYWORDS
            .iter()
            .map(|(cat, kws)| (*cat, kws.iter().map(|k| normalize_text(k)).collect()))
            .collect();
        Self { tables, precedence }
    }

    fn rank(&self, cat: SupportCategory) -> usize {
        self.precedence
            .iter()
            .position(|c| *c == cat)
            .unwrap_or(self.precedence.len())
    }

    /// Number of keyword phrases of each category present in `text`.
    pub fn scores(&self, text: &str) -> Vec<(SupportCategory, usize)> {
        let norm = normalize_text(text);
        self.tables
            .iter()
            .map(|(cat, kws)| (*cat, kws.iter().filter(|k| norm.contains(k.as_str())).count()))
            .collect()
    }

    pub fn classify(&self, text: &str) -> SupportCategory {
        let mut best: Option<(SupportCategory, usize)> = None;
        for (cat, score) in self.scores(text) {
            if score == 0 {
                continue;
            }
            best = match best {
                None => Some((cat, score)),
                Some((b, bs)) if score > bs || (score == bs && self.rank(cat) < self.rank(b)) => {
                    Some((cat, score))
                }
                keep => keep,
            };
        }
        best.map(|(c, _)| c).unwrap_or(SupportCategory::Outro)
    }
}

struct StatusPatterns {
    open: Regex,
    closed: Regex,
    planned: Regex,
}

fn status_patterns() -> &'static StatusPatterns {
    static RE: OnceCell<StatusPatterns> = OnceCell::new();
    RE.get_or_init(|| StatusPatterns {
        open: Regex::new(
            r"\b(aberto|abertos|aberta|abertas|abertura|em curso|submissoes abertas|open|active)\b",
        )
        .unwrap(),
        closed: Regex::new(
            r"\b(encerrado|encerrados|encerrada|encerradas|fechado|fechada|fechados|fechadas|terminado|terminada|expirado|expirada|closed|expired)\b",
        )
        .unwrap(),
        planned: Regex::new(
            r"\b(breve|previsto|prevista|futuro|futura|a abrir|coming soon|planned)\b",
        )
        .unwrap(),
    })
}

/// Lifecycle status from free text. OPEN is checked before CLOSED before
/// PLANNED; the first group with a match wins.
pub fn infer_status(text: &str) -> ProgramStatus {
    let norm = normalize_text(text);
    let p = status_patterns();
    if p.open.is_match(&norm) {
        ProgramStatus::Open
    } else if p.closed.is_match(&norm) {
        ProgramStatus::Closed
    } else if p.planned.is_match(&norm) {
        ProgramStatus::Planned
    } else {
        ProgramStatus::Unknown
    }
}

/// True when the text mentions any category keyword or a generic
/// energy-efficiency term.
pub fn is_relevant_to_energy_efficiency(text: &str) -> bool {
    let norm = normalize_text(text);
    CATEGORY_KEYWORDS
        .iter()
        .flat_map(|(_, kws)| kws.iter())
        .chain(GENERIC_RELEVANCE_TERMS.iter())
        .any(|k| norm.contains(&normalize_text(k)))
}

fn blocked_title_patterns() -> &'static [Regex] {
    static RE: OnceCell<Vec<Regex>> = OnceCell::new();
    RE.get_or_init(|| {
        [
            r"^ignorar links",
            r"^skip to",
            r"^saltar para",
            r"canal de denuncias",
            r"politica de privacidade",
            r"privacy policy",
            r"cookie policy",
            r"termos (e )?condicoes",
            r"terms (and )?conditions",
            r"contactos?$",
            r"contact us$",
            r"^mapa do site$",
            r"^sitemap$",
            r"^rss$",
            r"^login$",
            r"^regist[ao]r?$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Navigation/boilerplate titles that never name a program.
pub fn should_block_title(title: &str) -> bool {
    let norm = normalize_text(title);
    blocked_title_patterns().iter().any(|re| re.is_match(&norm))
}

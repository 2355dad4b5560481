// src/ingest/extract.rs
//! Deep section extraction: read a program detail page and pull out the
//! "how to apply", beneficiaries, documents, amount, deadline, legislation
//! and FAQ sections by heading.

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::ingest::classify::{infer_status, CategoryClassifier};
use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::{DiscoveredCandidate, ProgramStatus, SupportCategory};
use crate::text::{normalize_spaces, normalize_text, truncate_chars};

pub const MAX_SECTION_CHARS: usize = 5_000;
pub const MIN_SECTION_CHARS: usize = 20;

/// Section kinds recognised from heading text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    HowToApply,
    Beneficiaries,
    Documents,
    Legislation,
    Amount,
    Deadline,
    WhatIs,
    Faq,
}

/// Ordered pattern groups, matched against the folded lowercase heading.
/// The first group with a matching pattern names the section.
pub const SECTION_PATTERNS: &[(SectionKind, &[&str])] = &[
    (
        SectionKind::HowToApply,
        &[
            r"como\s+se\s+candidatar",
            r"candidatura",
            r"como\s+candidatar",
            r"submissao",
            r"como\s+submeter",
            r"processo\s+de\s+candidatura",
            r"how\s+to\s+apply",
            r"application\s+process",
            r"apply\s+now",
            r"submit\s+application",
        ],
    ),
    (
        SectionKind::Beneficiaries,
        &[
            r"beneficiarios",
            r"quem\s+pode\s+candidatar",
            r"destinatarios",
            r"publico[\s-]alvo",
            r"entidades\s+elegiveis",
            r"beneficiaries",
            r"who\s+can\s+apply",
            r"eligible\s+applicants",
            r"target\s+audience",
            r"eligibility",
        ],
    ),
    (
        SectionKind::Documents,
        &[
            r"documentos?\s+(necessarios?|exigidos?|obrigatorios?)",
            r"documentacao",
            r"anexos?\s+obrigatorios",
            r"formularios",
            r"required\s+documents?",
            r"documentation",
            r"supporting\s+documents?",
            r"attachments?",
        ],
    ),
    (
        SectionKind::Legislation,
        &[
            r"legislacao\s+aplicavel",
            r"enquadramento\s+legal",
            r"base\s+legal",
            r"regulamento",
            r"applicable\s+legislation",
            r"legal\s+framework",
            r"regulations?",
        ],
    ),
    (
        SectionKind::Amount,
        &[
            r"montante",
            r"valor\s+do\s+apoio",
            r"financiamento",
            r"incentivo",
            r"comparticipacao",
            r"amount",
            r"funding",
            r"grant\s+value",
            r"support\s+value",
            r"incentive",
        ],
    ),
    (
        SectionKind::Deadline,
        &[
            r"prazo",
            r"data\s+limite",
            r"encerramento",
            r"candidaturas\s+abertas\s+ate",
            r"deadline",
            r"closing\s+date",
            r"applications?\s+close",
            r"until",
        ],
    ),
    (
        SectionKind::WhatIs,
        &[
            r"o\s+que\s+e",
            r"descricao",
            r"sobre\s+o\s+programa",
            r"apresentacao",
            r"what\s+is",
            r"about\s+the\s+program",
            r"overview",
            r"description",
        ],
    ),
    (
        SectionKind::Faq,
        &[
            r"perguntas\s+frequentes",
            r"faqs?",
            r"duvidas",
            r"frequently\s+asked",
            r"questions",
        ],
    ),
];

const APPLICATION_LINK_PATTERNS: &[&str] = &[
    r"candidatar",
    r"submeter",
    r"inscrever",
    r"formulario",
    r"aceder.*plataforma",
    r"apply",
    r"submit",
    r"register",
    r"application\s+form",
];

fn compiled_sections() -> &'static [(SectionKind, Vec<Regex>)] {
    static RE: OnceCell<Vec<(SectionKind, Vec<Regex>)>> = OnceCell::new();
    RE.get_or_init(|| {
        SECTION_PATTERNS
            .iter()
            .map(|(kind, pats)| (*kind, pats.iter().map(|p| Regex::new(p).unwrap()).collect()))
            .collect()
    })
}

fn application_link_patterns() -> &'static [Regex] {
    static RE: OnceCell<Vec<Regex>> = OnceCell::new();
    RE.get_or_init(|| {
        APPLICATION_LINK_PATTERNS
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
    })
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

struct Selectors {
    headings: Selector,
    tabs: Selector,
    list_items: Selector,
    anchors: Selector,
    main: Selector,
    body: Selector,
    h1: Selector,
    title: Selector,
}

fn selectors() -> &'static Selectors {
    static SEL: OnceCell<Selectors> = OnceCell::new();
    SEL.get_or_init(|| Selectors {
        headings: sel(r#"h1, h2, h3, h4, h5, h6, .title, [class*="title"], [class*="heading"]"#),
        tabs: sel(r#".nav-tabs a, .tab-link, [role="tab"]"#),
        list_items: sel("li, .list-item"),
        anchors: sel("a[href]"),
        main: sel(r#"main, .content, article, [role="main"]"#),
        body: sel("body"),
        h1: sel("h1"),
        title: sel("title"),
    })
}

/// Classify a heading into a section kind.
pub fn classify_heading(title: &str) -> Option<SectionKind> {
    let norm = normalize_text(title);
    compiled_sections()
        .iter()
        .find(|(_, pats)| pats.iter().any(|re| re.is_match(&norm)))
        .map(|(kind, _)| *kind)
}

fn is_heading_tag(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn text_of(el: &ElementRef<'_>) -> String {
    normalize_spaces(&el.text().collect::<Vec<_>>().join(" "))
}

/// A heading (or tab) and the text that belongs to it.
#[derive(Debug, Clone)]
pub struct ExtractedSection {
    pub title: String,
    pub kind: Option<SectionKind>,
    pub content: String,
    /// List items found inside the section body.
    pub items: Vec<String>,
}

fn list_items_within(el: &ElementRef<'_>) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    if selectors().list_items.matches(el) {
        items.push(text_of(el));
    }
    items.extend(el.select(&selectors().list_items).map(|li| text_of(&li)));
    items
}

fn parent_text_without_headings(heading: &ElementRef<'_>) -> String {
    let Some(parent) = heading.parent().and_then(ElementRef::wrap) else {
        return String::new();
    };
    let mut parts = Vec::new();
    for node in parent.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_heading = node
            .ancestors()
            .take_while(|a| a.id() != parent.id())
            .filter_map(ElementRef::wrap)
            .any(|e| is_heading_tag(e.value().name()));
        if !in_heading {
            parts.push(String::from(&**text));
        }
    }
    normalize_spaces(&parts.join(" "))
}

/// Find every heading-delimited and tab-delimited section of the page.
pub fn extract_sections(doc: &Html) -> Vec<ExtractedSection> {
    let s = selectors();
    let mut sections = Vec::new();

    for heading in doc.select(&s.headings) {
        let title = text_of(&heading);
        if title.chars().count() < 3 {
            continue;
        }

        let siblings: Vec<ElementRef<'_>> = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .collect();

        let (content, items) = if siblings.is_empty() {
            (parent_text_without_headings(&heading), Vec::new())
        } else {
            let mut parts = Vec::new();
            let mut items = Vec::new();
            for sib in siblings
                .iter()
                .take_while(|e| !is_heading_tag(e.value().name()))
            {
                parts.push(truncate_chars(&text_of(sib), MAX_SECTION_CHARS));
                items.extend(list_items_within(sib));
            }
            (normalize_spaces(&parts.join(" ")), items)
        };

        if content.chars().count() > MIN_SECTION_CHARS {
            sections.push(ExtractedSection {
                kind: classify_heading(&title),
                title,
                content: truncate_chars(&content, MAX_SECTION_CHARS),
                items,
            });
        }
    }

    for tab in doc.select(&s.tabs) {
        let title = text_of(&tab);
        let target = tab
            .value()
            .attr("href")
            .filter(|h| h.starts_with('#'))
            .or_else(|| tab.value().attr("data-target"))
            .or_else(|| tab.value().attr("aria-controls"))
            .map(|t| t.trim_start_matches('#').trim())
            .filter(|t| !t.is_empty() && !t.contains('"'));
        let Some(target) = target else {
            continue;
        };
        let Ok(panel_sel) = Selector::parse(&format!(r#"[id="{target}"]"#)) else {
            continue;
        };
        if let Some(panel) = doc.select(&panel_sel).next() {
            let content = truncate_chars(&text_of(&panel), MAX_SECTION_CHARS);
            if content.is_empty() {
                continue;
            }
            sections.push(ExtractedSection {
                kind: classify_heading(&title),
                items: list_items_within(&panel),
                title,
                content,
            });
        }
    }

    sections
}

fn document_list(section: &ExtractedSection) -> Vec<String> {
    let in_bounds = |s: &String| (5..=200).contains(&s.chars().count());
    let items: Vec<String> = section
        .items
        .iter()
        .map(|s| normalize_spaces(s))
        .filter(in_bounds)
        .collect();
    if !items.is_empty() {
        return items;
    }
    section
        .content
        .split(|c| matches!(c, ';' | '•' | '-' | '\n'))
        .map(|s| s.trim().to_string())
        .filter(in_bounds)
        .collect()
}

fn find_application_url(doc: &Html, base: Option<&Url>) -> Option<String> {
    let pats = application_link_patterns();
    for a in doc.select(&selectors().anchors) {
        let href = a.value().attr("href").unwrap_or_default().trim();
        if !(href.starts_with("http") || href.starts_with('/')) {
            continue;
        }
        let text = normalize_text(&text_of(&a));
        let href_norm = href.to_lowercase();
        if !pats.iter().any(|re| re.is_match(&text) || re.is_match(&href_norm)) {
            continue;
        }
        if href.starts_with("http") {
            return Some(href.to_string());
        }
        if let Some(abs) = base.and_then(|b| b.join(href).ok()) {
            return Some(abs.to_string());
        }
    }
    None
}

fn month_number(name: &str) -> Option<u32> {
    let n = match normalize_text(name).as_str() {
        "janeiro" => 1,
        "fevereiro" => 2,
        "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(n)
}

/// Parse the first date found in a Portuguese deadline text:
/// `DD/MM/YYYY`, `YYYY-MM-DD` or `DD de <mês> de YYYY`.
pub fn parse_deadline_date(text: &str) -> Option<NaiveDate> {
    static RE: OnceCell<[Regex; 3]> = OnceCell::new();
    let [dmy, iso, long] = RE.get_or_init(|| {
        [
            Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap(),
            Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(),
            Regex::new(r"(?i)(\d{1,2})\s+de\s+(\w+)\s+de\s+(\d{4})").unwrap(),
        ]
    });
    let num = |s: &str| s.parse::<u32>().ok();

    if let Some(c) = dmy.captures(text) {
        let y = c[3].parse::<i32>().ok()?;
        if let Some(d) = NaiveDate::from_ymd_opt(y, num(&c[2])?, num(&c[1])?) {
            return Some(d);
        }
    }
    if let Some(c) = iso.captures(text) {
        let y = c[1].parse::<i32>().ok()?;
        if let Some(d) = NaiveDate::from_ymd_opt(y, num(&c[2])?, num(&c[3])?) {
            return Some(d);
        }
    }
    if let Some(c) = long.captures(text) {
        let y = c[3].parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(y, month_number(&c[2])?, num(&c[1])?);
    }
    None
}

/// Structured view of a program detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDetails {
    pub url: String,
    pub title: Option<String>,
    pub how_to_apply: Option<String>,
    pub beneficiaries: Option<String>,
    pub required_documents: Vec<String>,
    pub legislation: Option<String>,
    pub support_amount: Option<String>,
    pub deadline: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    pub what_is: Option<String>,
    pub faq: Option<String>,
    pub application_url: Option<String>,
    pub entity: Option<String>,
    pub category: Option<SupportCategory>,
    pub status: ProgramStatus,
    pub raw_sections: BTreeMap<String, String>,
}

impl ProgramDetails {
    /// Minimal result for a page that could not be read.
    pub fn unavailable(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: ProgramStatus::Unknown,
            ..Default::default()
        }
    }

    /// Merge into a discovered candidate. Extracted sections replace the
    /// candidate's; description and entity are only filled when missing.
    pub fn apply_to(self, candidate: &mut DiscoveredCandidate) {
        if self.category.is_some() {
            candidate.category = self.category;
        }
        candidate.how_to_apply = self.how_to_apply;
        candidate.application_url = self.application_url;
        candidate.required_documents = self.required_documents;
        candidate.beneficiaries = self.beneficiaries;
        candidate.support_amount = self.support_amount;
        candidate.deadline = self.deadline;
        candidate.deadline_date = self.deadline_date;
        candidate.legislation = self.legislation;
        candidate.faq = self.faq;
        if candidate.entity.is_none() {
            candidate.entity = self.entity;
        }
        if candidate.description.is_none() {
            candidate.description = self
                .what_is
                .or_else(|| self.raw_sections.get("O que é").cloned())
                .or_else(|| self.raw_sections.get("What is").cloned());
        }
        if self.status != ProgramStatus::Unknown {
            candidate.status = Some(self.status);
        }
        candidate.raw_sections = self.raw_sections;
    }
}

/// Extract details from an already-fetched page. Pure; no I/O.
pub fn extract_details_from_html(
    html: &str,
    url: &str,
    classifier: &CategoryClassifier,
) -> ProgramDetails {
    let doc = Html::parse_document(html);
    let s = selectors();
    let base = Url::parse(url).ok();

    let title = doc
        .select(&s.h1)
        .next()
        .map(|e| text_of(&e))
        .filter(|t| !t.is_empty())
        .or_else(|| doc.select(&s.title).next().map(|e| text_of(&e)))
        .filter(|t| !t.is_empty());

    let mut details = ProgramDetails {
        url: url.to_string(),
        title: title.clone(),
        ..Default::default()
    };

    for section in extract_sections(&doc) {
        details
            .raw_sections
            .insert(section.title.clone(), section.content.clone());
        // later sections of the same kind replace earlier ones
        match section.kind {
            Some(SectionKind::HowToApply) => details.how_to_apply = Some(section.content),
            Some(SectionKind::Beneficiaries) => details.beneficiaries = Some(section.content),
            Some(SectionKind::Documents) => details.required_documents = document_list(&section),
            Some(SectionKind::Legislation) => details.legislation = Some(section.content),
            Some(SectionKind::Amount) => details.support_amount = Some(section.content),
            Some(SectionKind::Deadline) => {
                details.deadline_date = parse_deadline_date(&section.content);
                details.deadline = Some(section.content);
            }
            Some(SectionKind::WhatIs) => details.what_is = Some(section.content),
            Some(SectionKind::Faq) => details.faq = Some(section.content),
            None => {}
        }
    }

    details.application_url = find_application_url(&doc, base.as_ref());

    let full_text = doc
        .select(&s.main)
        .next()
        .map(|e| text_of(&e))
        .filter(|t| !t.is_empty())
        .or_else(|| doc.select(&s.body).next().map(|e| text_of(&e)))
        .unwrap_or_default();

    details.category = Some(classifier.classify(&format!(
        "{} {}",
        title.as_deref().unwrap_or_default(),
        full_text
    )));
    details.status = infer_status(&full_text);
    details
}

/// Fetch and extract a detail page. Never fails: an unreachable page gives
/// `{url, status: UNKNOWN}`. Sleeps `delay` after a successful extraction.
pub async fn extract_details(
    fetcher: &dyn PageFetcher,
    url: &str,
    classifier: &CategoryClassifier,
    delay: Duration,
) -> ProgramDetails {
    let Some(html) = fetcher.fetch_html(url).await else {
        tracing::warn!(target: "ingest", url, "detail page unavailable");
        return ProgramDetails::unavailable(url);
    };
    let details = extract_details_from_html(&html, url, classifier);
    tracing::info!(
        target: "ingest",
        url,
        sections = details.raw_sections.len(),
        category = ?details.category,
        has_how_to_apply = details.how_to_apply.is_some(),
        documents = details.required_documents.len(),
        "detail page extracted"
    );
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_map_to_first_matching_group() {
        assert_eq!(classify_heading("Como se candidatar?"), Some(SectionKind::HowToApply));
        assert_eq!(classify_heading("Quem pode candidatar-se"), Some(SectionKind::Beneficiaries));
        assert_eq!(classify_heading("Documentos necessários"), Some(SectionKind::Documents));
        assert_eq!(classify_heading("Legislação aplicável"), Some(SectionKind::Legislation));
        assert_eq!(classify_heading("Valor do apoio"), Some(SectionKind::Amount));
        assert_eq!(classify_heading("Prazo"), Some(SectionKind::Deadline));
        assert_eq!(classify_heading("O que é?"), Some(SectionKind::WhatIs));
        assert_eq!(classify_heading("Perguntas frequentes"), Some(SectionKind::Faq));
        assert_eq!(classify_heading("Notícias"), None);
    }

    #[test]
    fn deadline_dates_in_three_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(parse_deadline_date("até 31/03/2025, 17h"), Some(d));
        assert_eq!(parse_deadline_date("fecha a 2025-03-31"), Some(d));
        assert_eq!(parse_deadline_date("Até 31 de março de 2025"), Some(d));
        assert_eq!(parse_deadline_date("31 de Brumário de 2025"), None);
        assert_eq!(parse_deadline_date("sem prazo"), None);
    }

    #[test]
    fn document_section_prefers_list_items() {
        let html = r#"<html><body><main>
            <h2>Documentos necessários</h2>
            <ul><li>Cartão de cidadão</li><li>Fatura da obra</li><li>x</li></ul>
            <h2>Prazo</h2><p>Candidaturas até 31/12/2025 inclusive.</p>
        </main></body></html>"#;
        let d = extract_details_from_html(html, "https://x.pt/p", &CategoryClassifier::default());
        assert_eq!(d.required_documents, vec!["Cartão de cidadão", "Fatura da obra"]);
        assert_eq!(d.deadline_date, NaiveDate::from_ymd_opt(2025, 12, 31));
    }

    #[test]
    fn document_section_falls_back_to_separators() {
        let html = r#"<html><body>
            <h3>Documentação</h3><p>Cópia do BI; Certidão predial • Orçamento detalhado</p>
        </body></html>"#;
        let d = extract_details_from_html(html, "https://x.pt/p", &CategoryClassifier::default());
        assert_eq!(
            d.required_documents,
            vec!["Cópia do BI", "Certidão predial", "Orçamento detalhado"]
        );
    }

    #[test]
    fn tabs_become_sections() {
        let html = r##"<html><body>
            <ul class="nav-tabs"><li><a href="#t1">Beneficiários</a></li></ul>
            <div id="t1">Famílias residentes em habitação própria permanente.</div>
        </body></html>"##;
        let d = extract_details_from_html(html, "https://x.pt/p", &CategoryClassifier::default());
        assert_eq!(
            d.beneficiaries.as_deref(),
            Some("Famílias residentes em habitação própria permanente.")
        );
    }

    #[test]
    fn application_link_is_made_absolute() {
        let html = r#"<html><body><p>Texto</p>
            <a href="/noticias">Notícias</a>
            <a href="/balcao/candidatar">Submeter candidatura</a></body></html>"#;
        let d = extract_details_from_html(html, "https://www.fundoambiental.pt/programa", &CategoryClassifier::default());
        assert_eq!(
            d.application_url.as_deref(),
            Some("https://www.fundoambiental.pt/balcao/candidatar")
        );
    }
}

// src/workers/legal.rs
//! Legal backstop over the Diário da República: search API plus search
//! pages and act detail pages, for regulations and notices the canonical
//! sources miss.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use super::registry::{IngestContext, IngestWorker, SourceDescriptor, SourceKind};
use super::result::{RunTally, WorkerOutput};
use crate::ingest::discovery::{extract_candidates_from_html, DiscoveryOptions};
use crate::ingest::fetch::{Accept, PageFetcher};
use crate::ingest::persist::{persist_candidate, PersistOverrides};
use crate::ingest::types::{DiscoveredCandidate, DiscoveryContext, ProgramType};
use crate::sources::municipalities::Municipality;
use crate::sources::{CanonicalSourceDefinition, SourceCatalog, DIARIO_REPUBLICA};
use crate::text::{normalize_spaces, normalize_text};

pub const SEARCH_TERMS: &[&str] = &[
    "eficiência energética habitação",
    "pobreza energética",
    "regulamento municipal eficiência",
    "fundo eficiência energética",
    "isolamento térmico habitação",
    "reabilitação urbana energia",
];

const SEARCH_URL_PATTERNS: &[&str] = &[
    "https://dre.pt/web/guest/pesquisa/-/search?q={q}&perPage=50&sort=whenSearchable",
    "https://dre.pt/web/guest/pesquisa/-/search?q={q}&fqs={q}&filterAction=TRUE&perPage=100&sort=whenSearchable&sortOrder=DESC",
    "https://dre.pt/pesquisa/-/search?q={q}&perPage=50&sort=whenSearchable",
    "https://dre.pt/pesquisa/-/search?query={q}&fqs={q}&filterAction=TRUE&perPage=100&sort=whenSearchable&sortOrder=DESC",
    "https://diariodarepublica.pt/pesquisa/-/search?q={q}&perPage=50&sort=whenSearchable",
];

const API_ENDPOINTS: &[&str] = &[
    "https://data.dre.pt/api/v1/act/search",
    "https://dre.pt/api/v1/act/search",
];

const LEGAL_ACT_KEYWORDS: &[&str] = &[
    "decreto-lei",
    "portaria",
    "regulamento",
    "aviso",
    "deliberação",
    "despacho",
];

const ACTION_KEYWORDS: &[&str] = &[
    "candidatura",
    "candidatar",
    "apoio",
    "incentivo",
    "programa",
    "aviso",
    "concurso",
    "beneficiario",
    "submissao",
    "submeter",
    "formulario",
];

const TOPIC_KEYWORDS: &[&str] = &[
    "eficiencia",
    "energetica",
    "habitacao",
    "reabilitacao",
    "isolamento",
    "vale eficiencia",
    "fundo ambiental",
    "energia",
];

const BLOCKED_TITLE_MARKERS: &[&str] = &[
    "mapa do site",
    "politica de privacidade",
    "acessibilidade",
    "cookies",
    "contactos",
    "rss",
];

const API_ARRAY_KEYS: &[&str] = &["items", "results", "content", "data", "docs", "list"];

fn municipal_patterns() -> &'static [Regex] {
    static RE: OnceCell<Vec<Regex>> = OnceCell::new();
    RE.get_or_init(|| {
        [
            r"\bcamara municipal (?:de|da|do)\s+([a-z0-9\s\-]{3,80})",
            r"\bmunicipio (?:de|da|do)\s+([a-z0-9\s\-]{3,80})",
            r"\bassembleia municipal (?:de|da|do)\s+([a-z0-9\s\-]{3,80})",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn detail_url_patterns() -> &'static [Regex] {
    static RE: OnceCell<Vec<Regex>> = OnceCell::new();
    RE.get_or_init(|| {
        [
            r#"(?i)https?://(?:www\.)?(?:dre|diariodarepublica)\.pt/[^\s"'<>)]*/search/\d+/details/(?:normal|maximized)[^\s"'<>)]*"#,
            r#"(?i)/[^\s"'<>)]*/search/\d+/details/(?:normal|maximized)[^\s"'<>)]*"#,
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn detail_path_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"/search/\d+/details/").unwrap())
}

struct DetailSelectors {
    h1: Selector,
    h2: Selector,
    og_title: Selector,
    title: Selector,
    meta_description: Selector,
    main_p: Selector,
    article_p: Selector,
}

fn detail_selectors() -> &'static DetailSelectors {
    static SEL: OnceCell<DetailSelectors> = OnceCell::new();
    SEL.get_or_init(|| DetailSelectors {
        h1: Selector::parse("h1").unwrap(),
        h2: Selector::parse("h2").unwrap(),
        og_title: Selector::parse(r#"meta[property="og:title"]"#).unwrap(),
        title: Selector::parse("title").unwrap(),
        meta_description: Selector::parse(r#"meta[name="description"]"#).unwrap(),
        main_p: Selector::parse("main p").unwrap(),
        article_p: Selector::parse("article p").unwrap(),
    })
}

/// Search page URLs for one term, in pattern order.
pub fn build_search_urls(term: &str) -> Vec<String> {
    let encoded: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
    let encoded = encoded.replace('+', "%20");
    let mut seen = HashSet::new();
    SEARCH_URL_PATTERNS
        .iter()
        .map(|p| p.replace("{q}", &encoded))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

pub fn is_official_dre_host(url: &str) -> bool {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    ["dre.pt", "diariodarepublica.pt"]
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

/// Source keywords, search terms and legal act names, normalized and
/// deduplicated.
pub fn legal_keywords(source: &CanonicalSourceDefinition) -> Vec<String> {
    let mut seen = HashSet::new();
    source
        .keywords
        .iter()
        .map(String::as_str)
        .chain(SEARCH_TERMS.iter().copied())
        .chain(LEGAL_ACT_KEYWORDS.iter().copied())
        .map(normalize_text)
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

/// Official host, a real title, an action word, and either a topic word,
/// an act detail link or one of the legal keywords.
pub fn is_likely_document_candidate(c: &DiscoveredCandidate, keywords: &[String]) -> bool {
    if !is_official_dre_host(&c.url) {
        return false;
    }
    let title = normalize_text(&c.title);
    if title.chars().count() < 12 {
        return false;
    }
    if BLOCKED_TITLE_MARKERS.iter().any(|m| title.contains(m)) {
        return false;
    }
    let text = normalize_text(&format!(
        "{} {} {}",
        c.title,
        c.description.as_deref().unwrap_or_default(),
        c.url
    ));
    let path = Url::parse(&c.url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    let is_detail = detail_path_re().is_match(&path) || path.ends_with(".pdf");

    if !ACTION_KEYWORDS.iter().any(|k| text.contains(k)) {
        return false;
    }
    TOPIC_KEYWORDS.iter().any(|k| text.contains(k))
        || is_detail
        || keywords.iter().any(|k| text.contains(k.as_str()))
}

fn clean_municipality_label(raw: &str) -> String {
    static RE_TAIL: OnceCell<Regex> = OnceCell::new();
    let tail = RE_TAIL.get_or_init(|| Regex::new(r"\b(concelho|distrito|freguesia)\b.*$").unwrap());
    let norm = normalize_text(raw);
    let cleaned = tail.replace(&norm, "");
    let cleaned: String = cleaned
        .chars()
        .map(|c| if ".,;:()".contains(c) { ' ' } else { c })
        .collect();
    normalize_spaces(&cleaned)
}

/// Municipality named by "câmara municipal de X", "município de X" or
/// "assembleia municipal de X". The capture is greedy, so when no exact
/// name matches the longest catalog name prefixing it wins.
pub fn resolve_municipality_from_text<'a>(
    text: &str,
    catalog: &'a SourceCatalog,
) -> Option<&'a Municipality> {
    let normalized = normalize_text(text);
    for re in municipal_patterns() {
        let Some(label) = re.captures(&normalized).and_then(|c| c.get(1)) else {
            continue;
        };
        let cleaned = clean_municipality_label(label.as_str());
        if cleaned.is_empty() {
            continue;
        }
        if let Some(m) = catalog.municipality_by_name(&cleaned) {
            return Some(m);
        }
        let best = catalog
            .municipalities()
            .iter()
            .filter(|m| cleaned.starts_with(&format!("{} ", m.match_key())))
            .max_by_key(|m| m.match_key().len());
        if best.is_some() {
            return best;
        }
    }
    None
}

/// Absolute, official-host act detail URLs found anywhere in a body.
pub fn extract_detail_urls(body: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for re in detail_url_patterns() {
        for m in re.find_iter(body) {
            let Ok(abs) = base.join(m.as_str()) else {
                continue;
            };
            let abs = abs.to_string();
            if is_official_dre_host(&abs) && seen.insert(abs.clone()) {
                out.push(abs);
            }
        }
    }
    out
}

/// Title and description of an act detail page.
pub fn detail_candidate_from_html(html: &str, url: &str) -> Option<DiscoveredCandidate> {
    let doc = Html::parse_document(html);
    let s = detail_selectors();
    let text = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(|e| normalize_spaces(&e.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
    };
    let attr = |sel: &Selector| {
        doc.select(sel)
            .next()
            .and_then(|e| e.value().attr("content"))
            .map(normalize_spaces)
            .filter(|t| !t.is_empty())
    };

    let title = text(&s.h1)
        .or_else(|| text(&s.h2))
        .or_else(|| attr(&s.og_title))
        .or_else(|| text(&s.title))?;
    if title.chars().count() < 8 {
        return None;
    }
    let description = attr(&s.meta_description)
        .or_else(|| text(&s.main_p))
        .or_else(|| text(&s.article_p));
    Some(DiscoveredCandidate {
        description,
        ..DiscoveredCandidate::new(title, url)
    })
}

/// JSON inside a body that may carry extra text around it.
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    let first = trimmed.find(['{', '['])?;
    let last = trimmed.rfind(['}', ']'])?;
    if last <= first {
        return None;
    }
    serde_json::from_str(&trimmed[first..=last]).ok()
}

/// Result records of an API payload: a top-level array, a well-known array
/// key, or else the largest nested array of objects.
pub fn extract_api_items(payload: &Value) -> Vec<Map<String, Value>> {
    fn objects(items: &[Value]) -> Vec<Map<String, Value>> {
        items
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .collect()
    }
    fn visit(v: &Value, found: &mut Vec<Vec<Map<String, Value>>>) {
        match v {
            Value::Array(items) => {
                let objs = objects(items);
                if !objs.is_empty() {
                    found.push(objs);
                }
            }
            Value::Object(map) => map.values().for_each(|n| visit(n, found)),
            _ => {}
        }
    }

    match payload {
        Value::Array(items) => objects(items),
        Value::Object(root) => {
            for key in API_ARRAY_KEYS {
                if let Some(Value::Array(items)) = root.get(*key) {
                    return objects(items);
                }
            }
            let mut found = Vec::new();
            visit(payload, &mut found);
            found.into_iter().max_by_key(Vec::len).unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn nested_strings(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|i| nested_strings(i, out)),
        Value::Object(map) => map.values().for_each(|i| nested_strings(i, out)),
        _ => {}
    }
}

/// First non-empty string under a key containing one of `hints`, searching
/// this level before nested objects.
pub fn find_string_by_hint(record: &Map<String, Value>, hints: &[&str]) -> Option<String> {
    for (key, value) in record {
        let Value::String(s) = value else {
            continue;
        };
        let key = normalize_text(key);
        if hints.iter().any(|h| key.contains(&normalize_text(h))) && !s.trim().is_empty() {
            return Some(s.trim().to_string());
        }
    }
    record.values().find_map(|v| match v {
        Value::Object(nested) => find_string_by_hint(nested, hints),
        _ => None,
    })
}

/// API text fields may carry markup and entities.
fn clean_api_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let decoded = html_escape::decode_html_entities(s);
    normalize_spaces(&re.replace_all(&decoded, " "))
}

fn official_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let base = Url::parse("https://dre.pt").ok()?;
    let abs = base.join(raw).ok()?.to_string();
    is_official_dre_host(&abs).then_some(abs)
}

pub fn api_item_to_candidate(item: &Map<String, Value>) -> Option<DiscoveredCandidate> {
    let mut strings = Vec::new();
    nested_strings(&Value::Object(item.clone()), &mut strings);

    let title = find_string_by_hint(item, &["title", "titulo", "epigrafe", "epigraph"])
        .or_else(|| strings.iter().find(|s| s.chars().count() > 16).cloned())
        .map(|t| clean_api_text(&t))
        .filter(|t| !t.is_empty())?;
    let url_raw = find_string_by_hint(item, &["url", "link", "href", "pdf", "portal"]).or_else(|| {
        strings
            .iter()
            .find(|s| {
                let l = s.to_ascii_lowercase();
                l.starts_with("http://") || l.starts_with("https://")
            })
            .cloned()
    });
    let fallback_id = find_string_by_hint(item, &["id", "actid", "documentid", "diplomaid"])
        .or_else(|| {
            strings
                .iter()
                .find(|s| s.len() >= 6 && s.chars().all(|c| c.is_ascii_digit()))
                .cloned()
        });
    let url = url_raw.as_deref().and_then(official_url).or_else(|| {
        fallback_id.as_deref().and_then(|id| {
            official_url(&format!(
                "https://dre.pt/web/guest/pesquisa/-/search/{id}/details/maximized"
            ))
        })
    })?;

    let description = find_string_by_hint(
        item,
        &["summary", "resumo", "description", "descricao", "descrição"],
    )
    .map(|d| clean_api_text(&d))
    .filter(|d| !d.is_empty());

    Some(DiscoveredCandidate {
        description,
        metadata: Some(Value::Object(item.clone())),
        ..DiscoveredCandidate::new(title, url)
    })
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(512).collect::<String>().to_ascii_lowercase();
    head.starts_with('<') && (head.contains("<html") || head.contains("<!doctype") || head.contains("<body"))
}

/// How the search API behaved during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiProbe {
    pub queried: usize,
    pub returned_html: usize,
    pub with_items: usize,
}

impl ApiProbe {
    fn add(&mut self, other: ApiProbe) {
        self.queried += other.queried;
        self.returned_html += other.returned_html;
        self.with_items += other.with_items;
    }

    /// Every endpoint answered a page instead of data.
    pub fn blocked(&self) -> bool {
        self.queried > 0 && self.returned_html == self.queried && self.with_items == 0
    }
}

/// Ordered candidate set keyed by (url, normalized title).
#[derive(Default)]
struct CandidateSet {
    seen: HashSet<(String, String)>,
    items: Vec<DiscoveredCandidate>,
}

impl CandidateSet {
    fn push(&mut self, c: DiscoveredCandidate) {
        if self.seen.insert((c.url.clone(), normalize_text(&c.title))) {
            self.items.push(c);
        }
    }
}

pub struct LegalBackstopWorker;

impl LegalBackstopWorker {
    async fn fetch_detail_candidates(
        fetcher: &dyn PageFetcher,
        urls: &[String],
        keywords: &[String],
        out: &mut CandidateSet,
    ) {
        for url in urls {
            let Some(html) = fetcher.fetch_html(url).await else {
                continue;
            };
            if let Some(c) = detail_candidate_from_html(&html, url) {
                if is_likely_document_candidate(&c, keywords) {
                    out.push(c);
                }
            }
        }
    }

    async fn search_api(
        ctx: &IngestContext,
        term: &str,
        keywords: &[String],
        out: &mut CandidateSet,
    ) -> ApiProbe {
        let mut probe = ApiProbe::default();
        for endpoint in API_ENDPOINTS {
            probe.queried += 1;
            let url = match Url::parse_with_params(
                endpoint,
                &[
                    ("query", term),
                    ("itemsPerPage", "50"),
                    ("page", "1"),
                    ("sort", "publicationDate,desc"),
                ],
            ) {
                Ok(u) => u.to_string(),
                Err(e) => {
                    tracing::warn!(target: "ingest", endpoint, error = %e, "bad api url");
                    continue;
                }
            };
            let Some(body) = ctx.fetcher.fetch(&url, Accept::Json).await else {
                tracing::warn!(target: "ingest", endpoint, term, "legal search api unavailable");
                continue;
            };
            if looks_like_html(&body) {
                probe.returned_html += 1;
            }
            let items = parse_json_lenient(&body)
                .map(|v| extract_api_items(&v))
                .unwrap_or_default();
            tracing::debug!(target: "ingest", endpoint, term, items = items.len(), "legal search api answered");
            if !items.is_empty() {
                probe.with_items += 1;
                for item in &items {
                    if let Some(c) = api_item_to_candidate(item) {
                        if is_likely_document_candidate(&c, keywords) {
                            out.push(c);
                        }
                    }
                }
            } else {
                let mut details = extract_detail_urls(&body, endpoint);
                details.truncate(ctx.settings.max_detail_links_per_query);
                Self::fetch_detail_candidates(ctx.fetcher.as_ref(), &details, keywords, out).await;
            }
        }
        probe
    }

    async fn search_pages(
        ctx: &IngestContext,
        source: &CanonicalSourceDefinition,
        term: &str,
        keywords: &[String],
        out: &mut CandidateSet,
    ) {
        let opts = DiscoveryOptions {
            keywords: keywords.to_vec(),
            allowed_hosts: source.allowed_hosts.clone(),
            require_application_intent: false,
        };
        let delay = Duration::from_millis(ctx.settings.legal_search_delay_ms);
        for url in build_search_urls(term) {
            if let Some(html) = ctx.fetcher.fetch_html(&url).await {
                for c in extract_candidates_from_html(&html, &url, &DiscoveryContext::default(), &opts) {
                    if is_likely_document_candidate(&c, keywords) {
                        out.push(c);
                    }
                }
                let mut details = extract_detail_urls(&html, &url);
                details.truncate(ctx.settings.max_detail_links_per_query);
                Self::fetch_detail_candidates(ctx.fetcher.as_ref(), &details, keywords, out).await;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl IngestWorker for LegalBackstopWorker {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: DIARIO_REPUBLICA.to_string(),
            name: "Diário da República".to_string(),
            kind: SourceKind::LegalBackstop,
            description: "Backstop legal para regulamentos e avisos.".to_string(),
        }
    }

    async fn run(&self, ctx: &IngestContext) -> Result<WorkerOutput> {
        let mut tally = RunTally::start();
        let source = ctx
            .catalog
            .source(DIARIO_REPUBLICA)
            .ok_or_else(|| anyhow!("legal source {DIARIO_REPUBLICA} missing from catalog"))?;
        let keywords = legal_keywords(source);
        tracing::info!(target: "ingest", terms = SEARCH_TERMS.len(), "legal backstop started");

        let mut candidates = CandidateSet::default();
        let mut probe = ApiProbe::default();
        for term in SEARCH_TERMS {
            let before = candidates.items.len();
            probe.add(Self::search_api(ctx, term, &keywords, &mut candidates).await);
            Self::search_pages(ctx, source, term, &keywords, &mut candidates).await;
            tracing::info!(
                target: "ingest",
                term,
                found = candidates.items.len() - before,
                api_queried = probe.queried,
                api_html = probe.returned_html,
                api_with_items = probe.with_items,
                "legal search finished"
            );
        }

        let mut items = candidates.items;
        items.truncate(ctx.settings.max_candidates_per_source);
        tally.found = items.len() as u64;
        let delay = Duration::from_millis(ctx.settings.legal_request_delay_ms);

        for mut candidate in items {
            let text = format!(
                "{} {}",
                candidate.title,
                candidate.description.as_deref().unwrap_or_default()
            );
            let overrides = match resolve_municipality_from_text(&text, &ctx.catalog) {
                Some(m) => {
                    candidate.municipality = Some(m.name.clone());
                    candidate.district = Some(m.district.clone());
                    PersistOverrides {
                        program_type: Some(ProgramType::Municipal),
                        entity: Some(format!("Câmara Municipal de {}", m.name)),
                        source_type: None,
                    }
                }
                None => PersistOverrides {
                    program_type: Some(ProgramType::National),
                    ..Default::default()
                },
            };
            match persist_candidate(ctx.store.as_ref(), source, &candidate, &overrides).await {
                Ok(outcome) => tally.record(outcome),
                Err(e) => {
                    tracing::error!(
                        target: "ingest",
                        title = %candidate.title,
                        url = %candidate.url,
                        error = ?e,
                        "persist failed"
                    );
                    tally.error(Some(&candidate.title), Some(&candidate.url), format!("{e:#}"));
                }
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if tally.found == 0 && probe.blocked() {
            tracing::warn!(
                target: "ingest",
                queried = probe.queried,
                returned_html = probe.returned_html,
                "legal search api answered html on every endpoint"
            );
            tally.error(
                Some("DRE API"),
                None,
                "search API endpoints answered HTML instead of JSON; programmatic access is probably blocked",
            );
        }

        Ok(tally.finish())
    }
}

// src/ingest/discovery.rs
//! Link discovery: turn a listing page into program candidates.

use metrics::counter;
use once_cell::sync::OnceCell;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::{DiscoveredCandidate, DiscoveryContext};
use crate::sources::keywords::{APPLICATION_INTENT_KEYWORDS, BLOCKED_DISCOVERY_MARKERS};
use crate::text::{contains_phrase, normalize_spaces, normalize_text, truncate_chars};

pub const MIN_TITLE_CHARS: usize = 12;
pub const MAX_CONTEXT_CHARS: usize = 900;

const LINK_CONTAINER_SELECTOR: &str =
    "article, li, tr, section, .card, .entry, .result, .list-item, .news-item";

fn anchor_selector() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse("a[href]").unwrap())
}

fn container_selector() -> &'static Selector {
    static SEL: OnceCell<Selector> = OnceCell::new();
    SEL.get_or_init(|| Selector::parse(LINK_CONTAINER_SELECTOR).unwrap())
}

/// Filters applied to every link of a page.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Keyword phrases; at least one must appear when non-empty.
    pub keywords: Vec<String>,
    /// Host allowlist; empty means any host.
    pub allowed_hosts: Vec<String>,
    pub require_application_intent: bool,
}

impl DiscoveryOptions {
    pub fn for_source(source: &crate::sources::CanonicalSourceDefinition) -> Self {
        Self {
            keywords: source.keywords.clone(),
            allowed_hosts: source.allowed_hosts.clone(),
            require_application_intent: source.require_application_intent,
        }
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Host equals an allowed host or is a subdomain of one; `www.` ignored.
pub fn is_allowed_host(url: &Url, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let host = strip_www(&host);
    allowed.iter().any(|a| {
        let a = a.trim().to_ascii_lowercase();
        let a = strip_www(&a);
        host == a || host.ends_with(&format!(".{a}"))
    })
}

/// Resolve `href` against `base`; only http(s) results survive.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let abs = base.join(href).ok()?;
    matches!(abs.scheme(), "http" | "https").then_some(abs)
}

pub fn has_blocked_marker(normalized: &str) -> bool {
    BLOCKED_DISCOVERY_MARKERS
        .iter()
        .any(|m| contains_phrase(normalized, &normalize_text(m)))
}

pub fn has_application_intent(normalized: &str) -> bool {
    APPLICATION_INTENT_KEYWORDS
        .iter()
        .any(|k| normalized.contains(&normalize_text(k)))
}

fn matches_keywords(normalized: &str, keywords: &[String]) -> bool {
    keywords.is_empty()
        || keywords
            .iter()
            .any(|k| normalized.contains(&normalize_text(k)))
}

fn element_text(el: &ElementRef<'_>) -> String {
    normalize_spaces(&el.text().collect::<Vec<_>>().join(" "))
}

fn nearest_container_text(anchor: &ElementRef<'_>) -> Option<String> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| container_selector().matches(el))
        .map(|el| truncate_chars(&element_text(&el), MAX_CONTEXT_CHARS))
        .filter(|t| !t.is_empty())
}

/// Extract candidates from an already-fetched page. Pure; no I/O.
pub fn extract_candidates_from_html(
    html: &str,
    base_url: &str,
    ctx: &DiscoveryContext,
    opts: &DiscoveryOptions,
) -> Vec<DiscoveredCandidate> {
    let Ok(base) = Url::parse(base_url) else {
        tracing::warn!(target: "ingest", url = base_url, "invalid base url");
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();

    for anchor in doc.select(anchor_selector()) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(abs) = resolve_link(&base, href) else {
            continue;
        };
        if !is_allowed_host(&abs, &opts.allowed_hosts) {
            continue;
        }

        let title = element_text(&anchor);
        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }

        let description = nearest_container_text(&anchor).filter(|d| *d != title);
        let url = abs.to_string();

        let searchable = normalize_text(&format!(
            "{} {} {}",
            title,
            description.as_deref().unwrap_or_default(),
            url
        ));
        if has_blocked_marker(&searchable) {
            continue;
        }
        if !matches_keywords(&searchable, &opts.keywords) {
            continue;
        }
        if opts.require_application_intent && !has_application_intent(&searchable) {
            continue;
        }

        if !seen.insert((url.clone(), normalize_text(&title))) {
            continue;
        }

        out.push(DiscoveredCandidate {
            title,
            url,
            description,
            municipality: ctx.municipality.clone(),
            district: ctx.district.clone(),
            ..Default::default()
        });
    }

    out
}

/// Fetch `url` and extract candidates. Fetch failure yields an empty list.
pub async fn discover(
    fetcher: &dyn PageFetcher,
    url: &str,
    ctx: &DiscoveryContext,
    opts: &DiscoveryOptions,
) -> Vec<DiscoveredCandidate> {
    let Some(html) = fetcher.fetch_html(url).await else {
        return Vec::new();
    };
    let found = extract_candidates_from_html(&html, url, ctx, opts);
    counter!("ingest_candidates_found_total").increment(found.len() as u64);
    tracing::debug!(target: "ingest", url, found = found.len(), "discovery pass");
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(keywords: &[&str], hosts: &[&str], intent: bool) -> DiscoveryOptions {
        DiscoveryOptions {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            allowed_hosts: hosts.iter().map(|s| s.to_string()).collect(),
            require_application_intent: intent,
        }
    }

    #[test]
    fn host_allowlist_accepts_subdomains_and_www() {
        let allowed = vec!["fundoambiental.pt".to_string()];
        let ok = Url::parse("https://www.fundoambiental.pt/x").unwrap();
        let sub = Url::parse("https://apoios.fundoambiental.pt/x").unwrap();
        let other = Url::parse("https://notfundoambiental.pt/x").unwrap();
        assert!(is_allowed_host(&ok, &allowed));
        assert!(is_allowed_host(&sub, &allowed));
        assert!(!is_allowed_host(&other, &allowed));
    }

    #[test]
    fn relative_links_resolve_and_fragments_are_skipped() {
        let base = Url::parse("https://www.fundoambiental.pt/avisos/").unwrap();
        assert_eq!(
            resolve_link(&base, "../apoios/vale.aspx").unwrap().as_str(),
            "https://www.fundoambiental.pt/apoios/vale.aspx"
        );
        assert!(resolve_link(&base, "#top").is_none());
        assert!(resolve_link(&base, "mailto:geral@fa.pt").is_none());
        assert!(resolve_link(&base, "javascript:void(0)").is_none());
    }

    #[test]
    fn short_titles_and_off_host_links_are_dropped() {
        let html = r#"<ul>
            <li><a href="/a">Apoio</a></li>
            <li><a href="https://elsewhere.pt/b">Aviso de candidaturas para edifícios</a></li>
            <li><a href="/c">Aviso de candidaturas para edifícios</a></li>
        </ul>"#;
        let out = extract_candidates_from_html(
            html,
            "https://www.fundoambiental.pt/",
            &DiscoveryContext::default(),
            &opts(&["aviso"], &["fundoambiental.pt"], false),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://www.fundoambiental.pt/c");
    }

    #[test]
    fn intent_is_required_when_asked() {
        let html = r#"<a href="/x">Notícia sobre habitação acessível</a>"#;
        let base = "https://www.portaldahabitacao.pt/";
        let ctx = DiscoveryContext::default();
        assert!(extract_candidates_from_html(html, base, &ctx, &opts(&["habitação"], &[], true)).is_empty());
        assert_eq!(
            extract_candidates_from_html(html, base, &ctx, &opts(&["habitação"], &[], false)).len(),
            1
        );
    }

    #[test]
    fn container_text_becomes_description_only_when_different() {
        let html = r#"
            <article><a href="/p1">Candidaturas Vale Eficiência 2024</a>
              <p>Apoio à substituição de janelas.</p></article>
            <li><a href="/p2">Aviso de candidatura habitação</a></li>"#;
        let out = extract_candidates_from_html(
            html,
            "https://x.pt/",
            &DiscoveryContext::default(),
            &opts(&[], &[], false),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].description.as_deref(),
            Some("Candidaturas Vale Eficiência 2024 Apoio à substituição de janelas.")
        );
        assert!(out[1].description.is_none());
    }
}

// src/ingest/municipal/csv.rs
//! Tolerant CSV/TSV parsing for the open-data municipality website listings.

use url::Url;

use super::{normalize_municipality_label, HostPreference, MunicipalitySite, SiteMap};
use crate::sources::SourceCatalog;
use crate::text::normalize_text;

const DELIMITER_CANDIDATES: [char; 3] = [';', '\t', ','];
const SAMPLE_LINES: usize = 5;

/// Pick the delimiter that splits the first lines the most. Ties keep the
/// candidate order `;`, tab, `,`.
pub fn detect_delimiter(lines: &[&str]) -> char {
    let mut best = (DELIMITER_CANDIDATES[0], 0usize);
    for d in DELIMITER_CANDIDATES {
        let score: usize = lines
            .iter()
            .take(SAMPLE_LINES)
            .map(|l| l.matches(d).count())
            .sum();
        if score > best.1 {
            best = (d, score);
        }
    }
    best.0
}

/// Parse a whole document into rows. Strips a UTF-8 BOM; rows may differ in
/// length and quoted cells may span lines. Blank rows are dropped.
pub fn parse_csv_table(body: &str) -> Vec<Vec<String>> {
    let body = body.strip_prefix('\u{feff}').unwrap_or(body);
    let sample: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return Vec::new();
    }
    let delimiter = detect_delimiter(&sample);

    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => {
                let row: Vec<String> = record.iter().map(str::to_string).collect();
                if row.iter().any(|c| !c.is_empty()) {
                    rows.push(row);
                }
            }
            Err(e) => {
                tracing::debug!(target: "ingest", error = %e, "skipping malformed csv record");
            }
        }
    }
    rows
}

fn is_municipality_header(cell: &str) -> bool {
    ["municipio", "concelho", "autarquia"]
        .iter()
        .any(|k| cell.contains(k))
}

fn is_website_header(cell: &str) -> bool {
    ["website", "site", "url", "endereco", "internet", "sitio web"]
        .iter()
        .any(|k| cell.contains(k))
}

/// Location of the header row and of the two columns of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub row: usize,
    pub municipality_col: usize,
    pub website_col: usize,
}

/// First row holding both a municipality-like and a website-like label.
/// A cell that reads as a website column is never taken as the
/// municipality column.
pub fn find_header(rows: &[Vec<String>]) -> Option<HeaderInfo> {
    rows.iter().enumerate().find_map(|(i, row)| {
        let cells: Vec<String> = row.iter().map(|c| normalize_text(c)).collect();
        let website_col = cells.iter().position(|c| is_website_header(c))?;
        let municipality_col = cells
            .iter()
            .enumerate()
            .position(|(j, c)| j != website_col && is_municipality_header(c))?;
        Some(HeaderInfo {
            row: i,
            municipality_col,
            website_col,
        })
    })
}

/// Turn a website cell into an absolute http(s) URL. Scheme-less values get
/// `https://`.
pub fn normalize_website_candidate(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    let prefixed = if lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("ftp://")
    {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    };
    let url = Url::parse(&prefixed).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.to_string())
}

/// Map table rows to municipality sites. `None` when no header row is found.
pub fn parse_sites_from_rows(
    rows: &[Vec<String>],
    catalog: &SourceCatalog,
    preference: &HostPreference,
) -> Option<SiteMap> {
    if rows.len() < 2 {
        return None;
    }
    let header = find_header(rows)?;
    let mut sites = SiteMap::new();

    for row in rows.iter().skip(header.row + 1) {
        let label = row.get(header.municipality_col).map(String::as_str).unwrap_or_default();
        let website_raw = row.get(header.website_col).map(String::as_str).unwrap_or_default();

        let label = normalize_municipality_label(label);
        if label.is_empty() {
            continue;
        }
        let Some(m) = catalog.municipality_by_name(&label) else {
            continue;
        };
        let Some(website) = normalize_website_candidate(website_raw) else {
            continue;
        };
        let current = sites.get(&m.id).map(|s| s.website.as_str());
        if !preference.prefers(&website, current) {
            continue;
        }
        sites.insert(m.id.clone(), MunicipalitySite::new(m, website));
    }
    Some(sites)
}

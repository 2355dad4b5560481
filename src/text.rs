// src/text.rs
//! Text helpers shared by the crawler, extractor, classifier and persistence:
//! accent folding, whitespace collapsing, slugs and content hashes.

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

fn re_ws() -> &'static Regex {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Map a Latin letter with a diacritic to its base letter. Covers the
/// Portuguese alphabet plus the usual Western European extras.
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        _ => c,
    }
}

/// Strip diacritics without touching case.
pub fn fold_diacritics(s: &str) -> String {
    s.chars().map(fold_char).collect()
}

/// Collapse whitespace runs to single spaces and trim. Keeps case and accents,
/// used for titles and descriptions that are persisted as-is.
pub fn normalize_spaces(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// Matching form of a text: accents folded, lowercased, whitespace collapsed.
/// Every keyword, marker and pattern comparison runs against this form.
pub fn normalize_text(s: &str) -> String {
    let folded = fold_diacritics(s).to_lowercase();
    normalize_spaces(&folded)
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// URL-safe slug: folded, lowercased, non-alphanumeric runs become `-`.
pub fn slugify(s: &str) -> String {
    let folded = normalize_text(s);
    let mut out = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// SHA-256 hex digest of the input.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// True when `needle` occurs in `haystack` delimited by non-alphanumeric
/// characters (or the string edges). Both sides are expected in matching form.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // advance past the first char of this occurrence
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

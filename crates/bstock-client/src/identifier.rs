//! Parsing of user input into stable item identifiers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Host keyword that marks schemeless input as a storefront URL.
pub const SITE_KEYWORD: &str = "thomann";

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").expect("scheme regex"));

static SCHEMELESS_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9-]+\.)+[a-z]{2,}(?:[/?#]\S*)?$").expect("host regex")
});

static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)[/_]product[_-]?(\d+)",
        r"(?i)/(\d+)\.html?",
        r"(?i)/p(\d+)/",
        r"(\d{5,})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("identifier regex"))
    .collect()
});

static SECONDARY_STOCK_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_b_stock\.htm(?:$|[?#])").expect("b-stock page regex"));

static PRODUCT_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.htm(?:$|[?#])").expect("product page regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PageKind {
    Product,
    SecondaryStock,
    Other,
}

/// Derives the identity key for user input.
///
/// URLs (with or without scheme) yield the first numeric article id found in
/// them, or the normalized URL itself when there is none. Bare digit strings
/// are returned as-is. Anything else is rejected with `None`.
pub fn extract_identifier(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if looks_like_url(input) {
        let normalized = normalize_url(input);
        let id = ID_PATTERNS
            .iter()
            .find_map(|pattern| pattern.captures(&normalized))
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str().to_string());
        return Some(id.unwrap_or(normalized));
    }

    if input.chars().all(|c| c.is_ascii_digit()) {
        return Some(input.to_string());
    }

    None
}

/// Identifier used for lookups, where unknown shapes fall back to the raw input.
pub fn identifier_or_raw(input: &str) -> String {
    extract_identifier(input).unwrap_or_else(|| input.trim().to_string())
}

pub fn is_url(value: &str) -> bool {
    SCHEME.is_match(value)
}

pub fn looks_like_url(input: &str) -> bool {
    SCHEME.is_match(input)
        || input.to_ascii_lowercase().contains(SITE_KEYWORD)
        || SCHEMELESS_HOST.is_match(input)
}

/// Prefixes `https://` onto schemeless input.
pub fn normalize_url(input: &str) -> String {
    let input = input.trim();
    if SCHEME.is_match(input) {
        input.to_string()
    } else {
        format!("https://{input}")
    }
}

/// Page to fetch for an identifier: URLs are kept, bare ids are expanded
/// against the storefront.
pub fn product_url_for(identifier: &str, site_base_url: &str) -> String {
    if is_url(identifier) {
        identifier.to_string()
    } else {
        format!("{}/{identifier}.html", site_base_url.trim_end_matches('/'))
    }
}

pub fn classify_page_url(url: &str) -> PageKind {
    if SECONDARY_STOCK_PAGE.is_match(url) {
        PageKind::SecondaryStock
    } else if PRODUCT_PAGE.is_match(url) {
        PageKind::Product
    } else {
        PageKind::Other
    }
}

//! Regex heuristics that turn a product page into [`PageFacts`].
//!
//! Everything here works on the raw markup; there is no DOM. The patterns are
//! tied to the storefront's current templates, so callers should go through
//! [`FactsExtractor`] rather than the free functions when they want to stay
//! independent of the parsing strategy.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;

/// Container holding the "B-Stock" offer link on a product page.
static SECONDARY_STOCK_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<div[^>]*class\s*=\s*["'][^"']*discounts-and-addons[^"']*["'][^>]*>.*?href\s*=\s*["'][^"']*b_stock[^"']*\.htm"#,
    )
    .expect("secondary stock regex")
});

static SECONDARY_STOCK_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<div[^>]*class\s*=\s*["'][^"']*discounts-and-addons[^"']*["'][^>]*>.*?href\s*=\s*["']([^"']*b_stock[^"']*\.html?)["']"#,
    )
    .expect("secondary stock href regex")
});

/// Tried in order; the first capture wins.
static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // structured metadata
        r#"(?i)itemprop=["']price["'][^>]*content=["']([0-9]+(?:[.,][0-9]{2})?)["']"#,
        // embedded JSON
        r#"(?i)"price"\s*:\s*"([0-9]+(?:[.,][0-9]{2})?)""#,
        r#"(?i)data-price["']?[=:]?["']?([0-9]+(?:[.,][0-9]{2})?)"#,
        // currency-adjacent literal
        r"(?i)\b([1-9][0-9]{1,5}[,.][0-9]{2})\s*€",
        r#"(?i)class=["'][^"']*price[^"']*["'][^>]*>\s*([1-9][0-9]{1,5}[,.][0-9]{2})"#,
        // FR / DE tax markers
        r"(?i)([1-9][0-9]{1,5}[,.][0-9]{2})\s*(?:€)?\s*(?:TTC|inkl\.)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("price regex"))
    .collect()
});

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<h1[^>]*>\s*([^<]+?)\s*</h1>").expect("heading regex"));

static IMAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)<meta\s+property=["']og:image["']\s+content=["']([^"']+)["']"#,
        r#"(?i)<meta\s+content=["']([^"']+)["']\s+property=["']og:image["']"#,
        r#"(?i)<img[^>]*data-img=["']([^"']+)["'][^>]*product"#,
        r#"(?i)<img[^>]*(?:class|id)=["'][^"']*product[^"']*["'][^>]*src=["']([^"']+)["']"#,
        r#"(?i)<img[^>]*src=["']([^"']*/(?:products|images)/[^"']+\.[a-z]{3,4})["']"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("image regex"))
    .collect()
});

/// Everything a single product page tells us.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFacts {
    pub secondary_stock: bool,
    pub price: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub secondary_stock_url: Option<String>,
}

impl PageFacts {
    pub fn from_html(html: &str, base_url: &str) -> Self {
        let secondary_stock = detect_secondary_stock(html);
        Self {
            secondary_stock,
            price: extract_price(html),
            name: extract_name(html),
            image_url: extract_image_url(html, base_url),
            secondary_stock_url: if secondary_stock {
                extract_secondary_stock_url(html, base_url)
            } else {
                None
            },
        }
    }
}

/// Parsing strategy used by the poller.
pub trait FactsExtractor: Send + Sync {
    fn page_facts(&self, html: &str, base_url: &str) -> PageFacts;

    /// Price shown on a secondary-stock page.
    fn price(&self, html: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor;

impl FactsExtractor for RegexExtractor {
    fn page_facts(&self, html: &str, base_url: &str) -> PageFacts {
        PageFacts::from_html(html, base_url)
    }

    fn price(&self, html: &str) -> Option<String> {
        extract_price(html)
    }
}

pub fn detect_secondary_stock(html: &str) -> bool {
    SECONDARY_STOCK_LINK.is_match(html)
}

pub fn extract_price(html: &str) -> Option<String> {
    PRICE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(html))
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().replacen(',', ".", 1))
}

pub fn extract_name(html: &str) -> Option<String> {
    HEADING
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Product image, absolute when it can be resolved against `base_url`.
pub fn extract_image_url(html: &str, base_url: &str) -> Option<String> {
    let raw = IMAGE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(html))
        .and_then(|captures| captures.get(1))?
        .as_str();
    Some(resolve_url(raw, base_url).unwrap_or_else(|| raw.to_string()))
}

pub fn extract_secondary_stock_url(html: &str, base_url: &str) -> Option<String> {
    let href = SECONDARY_STOCK_HREF
        .captures(html)
        .and_then(|captures| captures.get(1))?
        .as_str();
    resolve_url(href, base_url)
}

pub(crate) fn resolve_url(href: &str, base_url: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .ok()
        .map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.thomann.de/intl/fender_player_strat_123456.htm";

    fn product_page(addons: &str) -> String {
        format!(
            r#"<html><head>
<meta property="og:image" content="/pics/prod/123456.jpg">
</head><body>
<h1 class="fx-text">  Fender Player Stratocaster  </h1>
<div class="price-and-availability"><span itemprop="price" content="699.00"></span></div>
{addons}
</body></html>"#
        )
    }

    #[test]
    fn detects_secondary_stock_link_inside_container() {
        let html = product_page(
            r#"<div class="fx-content discounts-and-addons">
  <a class="link" href="/intl/fender_player_strat_b_stock.htm">B-Stock from 599 €</a>
</div>"#,
        );
        assert!(detect_secondary_stock(&html));
    }

    #[test]
    fn detection_ignores_case_and_attribute_order() {
        let html = r#"<DIV data-x="1" CLASS='Discounts-And-Addons'><A title="b" HREF='/X_B_STOCK.HTM'>b</A></DIV>"#;
        assert!(detect_secondary_stock(html));
    }

    #[test]
    fn no_detection_without_container_or_link() {
        assert!(!detect_secondary_stock(&product_page("")));
        assert!(!detect_secondary_stock(
            r#"<a href="/intl/fender_player_strat_b_stock.htm">orphan link</a>"#
        ));
        assert!(!detect_secondary_stock(
            r#"<div class="discounts-and-addons"><a href="/accessories.htm">x</a></div>"#
        ));
    }

    #[test]
    fn price_prefers_structured_metadata() {
        assert_eq!(
            extract_price(r#"itemprop="price" content="123.45""#).as_deref(),
            Some("123.45")
        );
        let html = r#"<span itemprop="price" content="699.00"></span><b>12,34 €</b>"#;
        assert_eq!(extract_price(html).as_deref(), Some("699.00"));
    }

    #[test]
    fn price_normalizes_decimal_comma() {
        assert_eq!(extract_price("69,00 €").as_deref(), Some("69.00"));
        assert_eq!(
            extract_price(r#"{"sku":"1","price":"149,00"}"#).as_deref(),
            Some("149.00")
        );
    }

    #[test]
    fn price_falls_back_to_class_and_tax_markers() {
        assert_eq!(
            extract_price(r#"<span class="fx-price">  459,00</span>"#).as_deref(),
            Some("459.00")
        );
        assert_eq!(extract_price("Prix 1299,00 TTC").as_deref(), Some("1299.00"));
        assert_eq!(extract_price("<p>no price here</p>"), None);
    }

    #[test]
    fn name_is_first_heading_trimmed() {
        assert_eq!(
            extract_name(&product_page("")).as_deref(),
            Some("Fender Player Stratocaster")
        );
        assert_eq!(extract_name("<h2>Not a title</h2>"), None);
    }

    #[test]
    fn image_url_is_resolved_against_page() {
        assert_eq!(
            extract_image_url(&product_page(""), BASE).as_deref(),
            Some("https://www.thomann.de/pics/prod/123456.jpg")
        );
        let html = r#"<img class="product-image main" alt="" src="https://cdn.example.com/a.jpg">"#;
        assert_eq!(
            extract_image_url(html, BASE).as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[test]
    fn secondary_stock_url_is_absolute() {
        let html = product_page(
            r#"<div class="discounts-and-addons"><a href="fender_player_strat_b_stock.htm">B</a></div>"#,
        );
        assert_eq!(
            extract_secondary_stock_url(&html, BASE).as_deref(),
            Some("https://www.thomann.de/intl/fender_player_strat_b_stock.htm")
        );
        assert_eq!(extract_secondary_stock_url(&product_page(""), BASE), None);
    }

    #[test]
    fn page_facts_only_resolve_secondary_url_when_detected() {
        let facts = RegexExtractor.page_facts(&product_page(""), BASE);
        assert!(!facts.secondary_stock);
        assert_eq!(facts.price.as_deref(), Some("699.00"));
        assert_eq!(facts.secondary_stock_url, None);
    }
}

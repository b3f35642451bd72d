//! Rule-driven field extraction: builds a full product record from parsed
//! HTML using per-site overrides with generic fallbacks, delegating price
//! discovery to the scorer.

use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::ProductRecord;
use crate::price_scorer::PriceScorer;
use crate::rules::{
    site_rules_for, HeuristicPatterns, SiteRuleSet, CURRENCY_SYMBOLS, GENERIC_DESCRIPTION_SELECTORS,
    GENERIC_IMAGE_SELECTORS, GENERIC_PRICE_SELECTORS, GENERIC_TITLE_SELECTORS, TLD_CURRENCIES,
};

const TITLE_MAX_LEN: usize = 200;
const DESCRIPTION_MAX_LEN: usize = 800;

pub struct ExtractorService {
    patterns: Arc<HeuristicPatterns>,
    scorer: PriceScorer,
}

impl ExtractorService {
    pub fn new() -> Self {
        let patterns = Arc::new(HeuristicPatterns::new());
        let scorer = PriceScorer::new(Arc::clone(&patterns));
        Self { patterns, scorer }
    }

    /// Extract a product record from raw HTML. Missing fields stay None;
    /// currency is always populated.
    pub fn extract(&self, html: &str, source_url: &str) -> ProductRecord {
        let document = Html::parse_document(html);
        let host = host_of(source_url);
        let site = site_rules_for(&host);

        let title = self.extract_title(&document, site);
        let raw_price = self.extract_raw_price(&document, site, source_url);
        // Currency detection reads the raw snippet before normalization
        // strips the symbols it relies on.
        let currency = self.detect_currency(raw_price.as_deref(), &host);
        let price = raw_price.map(|raw| self.scorer.normalize(&raw));
        let description = self.extract_description(&document, site);
        let image = self.extract_image(&document, source_url);

        debug!(
            url = source_url,
            has_title = title.is_some(),
            has_price = price.is_some(),
            currency = %currency,
            "extraction complete"
        );

        ProductRecord {
            title,
            price,
            currency,
            description,
            image,
            url: source_url.to_string(),
        }
    }

    fn extract_title(&self, document: &Html, site: Option<&SiteRuleSet>) -> Option<String> {
        // Site-specific selectors take priority.
        if let Some(rules) = site {
            for selector_str in rules.title {
                let Some(element) = select_first(document, selector_str) else {
                    continue;
                };
                let text = self.collapse_ws(&element_text(element));
                if text.len() > 5 {
                    return Some(truncate_chars(&text, TITLE_MAX_LEN));
                }
            }
        }

        for selector_str in GENERIC_TITLE_SELECTORS {
            let Some(element) = select_first(document, selector_str) else {
                continue;
            };

            let mut text = if element.value().name() == "meta" {
                element.value().attr("content").unwrap_or("").to_string()
            } else {
                element_text(element)
            };

            // Page titles carry the site name after a separator.
            if *selector_str == "title" {
                if let Some(head) = text.split(" - ").next() {
                    if text.contains(" - ") {
                        text = head.to_string();
                    }
                }
                if let Some(head) = text.split(" | ").next() {
                    if text.contains(" | ") {
                        text = head.to_string();
                    }
                }
            }

            let cleaned = self.collapse_ws(&text);
            if cleaned.len() > 5 && !is_blocklisted_title(&cleaned) {
                return Some(truncate_chars(&cleaned, TITLE_MAX_LEN));
            }
        }

        None
    }

    /// Raw price snippet, pre-normalization. The scorer runs first; a plain
    /// pass over the selector lists is kept only as a last-resort backstop.
    fn extract_raw_price(
        &self,
        document: &Html,
        site: Option<&SiteRuleSet>,
        source_url: &str,
    ) -> Option<String> {
        if let Some(price) = self.scorer.score_price(document, source_url) {
            return Some(price);
        }

        let site_selectors = site.map(|rules| rules.price).unwrap_or(&[]);
        for selector_str in site_selectors.iter().chain(GENERIC_PRICE_SELECTORS) {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for element in document.select(&selector) {
                let text = element_text(element);
                if !text.is_empty() && self.patterns.price_like.is_match(&text) {
                    return Some(text);
                }
            }
        }

        None
    }

    fn extract_description(&self, document: &Html, site: Option<&SiteRuleSet>) -> Option<String> {
        if let Some(rules) = site {
            for selector_str in rules.description {
                let Some(element) = select_first(document, selector_str) else {
                    continue;
                };

                let text = if element.value().name() == "ul" {
                    // Bullet-point descriptions: join the first few items.
                    let li = Selector::parse("li").ok()?;
                    let items: Vec<String> = element
                        .select(&li)
                        .take(5)
                        .map(|item| element_text(item))
                        .collect();
                    if items.is_empty() {
                        element_text(element)
                    } else {
                        items.join(". ")
                    }
                } else {
                    element_text(element)
                };

                let cleaned = self.collapse_ws(&text);
                if self.is_valid_description(&cleaned) {
                    return Some(ellipsize(&cleaned, DESCRIPTION_MAX_LEN));
                }
            }
        }

        for selector_str in GENERIC_DESCRIPTION_SELECTORS {
            let Some(element) = select_first(document, selector_str) else {
                continue;
            };

            let text = if element.value().name() == "meta" {
                element.value().attr("content").unwrap_or("").to_string()
            } else {
                element_text(element)
            };

            let cleaned = self.collapse_ws(&text);
            if self.is_valid_description(&cleaned) {
                return Some(ellipsize(&cleaned, DESCRIPTION_MAX_LEN));
            }
        }

        None
    }

    fn is_valid_description(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.len() < 20 {
            return false;
        }

        if self
            .patterns
            .description_blocklist
            .iter()
            .any(|pattern| pattern.is_match(trimmed))
        {
            return false;
        }

        if self
            .patterns
            .description_vocabulary
            .iter()
            .any(|pattern| pattern.is_match(trimmed))
        {
            return true;
        }

        trimmed.len() > 50
    }

    fn extract_image(&self, document: &Html, base_url: &str) -> Option<String> {
        for selector_str in GENERIC_IMAGE_SELECTORS {
            let Some(element) = select_first(document, selector_str) else {
                continue;
            };
            let value = element.value();
            let source = value
                .attr("src")
                .or_else(|| value.attr("data-src"))
                .or_else(|| value.attr("data-lazy"))
                .filter(|s| !s.is_empty());

            if let Some(source) = source {
                return Some(absolutize(source, base_url));
            }
        }
        None
    }

    /// Currency precedence: explicit code in the price text, then a symbol
    /// lookup, then TLD mapping, then "USD".
    fn detect_currency(&self, price_text: Option<&str>, host: &str) -> String {
        if let Some(text) = price_text {
            if let Some(caps) = self.patterns.currency_code.captures(text) {
                return caps[1].to_uppercase();
            }
            for (symbol, code) in CURRENCY_SYMBOLS {
                if text.contains(symbol) {
                    return (*code).to_string();
                }
            }
        }

        for (tld, code) in TLD_CURRENCIES {
            if host.ends_with(tld) {
                return (*code).to_string();
            }
        }

        "USD".to_string()
    }

    fn collapse_ws(&self, text: &str) -> String {
        self.patterns
            .whitespace
            .replace_all(text, " ")
            .trim()
            .to_string()
    }
}

impl Default for ExtractorService {
    fn default() -> Self {
        Self::new()
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}

fn select_first<'a>(document: &'a Html, selector_str: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector_str).ok()?;
    document.select(&selector).next()
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn is_blocklisted_title(text: &str) -> bool {
    let lower = text.to_lowercase();
    crate::rules::TITLE_BLOCKLIST_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut truncated: String = text.chars().take(max).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.to_string()
    }
}

fn absolutize(source: &str, base_url: &str) -> String {
    if let Some(rest) = source.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    if source.starts_with("http") {
        return source.to_string();
    }
    match Url::parse(base_url).and_then(|base| base.join(source)) {
        Ok(joined) => joined.to_string(),
        Err(_) => source.to_string(),
    }
}

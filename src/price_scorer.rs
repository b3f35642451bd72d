//! Tiered price discovery over a parsed document.
//!
//! Tier 1 scans meta tags, tier 2 applies per-domain whitelist selectors,
//! tier 3 falls back to currency-pattern matching with additive candidate
//! scoring. Tiers short-circuit: the first one producing a result wins.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::rules::{site_rules_for, HeuristicPatterns};

/// Element-text pair considered as a possible price during tier 3, created
/// and discarded within one scoring pass.
struct PriceCandidate<'a> {
    element: ElementRef<'a>,
    matched: String,
    index: usize,
    score: f64,
}

pub struct PriceScorer {
    patterns: Arc<HeuristicPatterns>,
}

impl PriceScorer {
    pub fn new(patterns: Arc<HeuristicPatterns>) -> Self {
        Self { patterns }
    }

    /// Best price string for the document, raw (pre-normalization), or None.
    pub fn score_price(&self, document: &Html, source_url: &str) -> Option<String> {
        let host = Url::parse(source_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        let site = site_rules_for(&host);

        if let Some(price) = self.from_metadata(document) {
            debug!(price = %price, "price found in metadata");
            return Some(price);
        }

        if let Some(rules) = site {
            if let Some(price) = self.from_whitelist(document, rules.price) {
                debug!(site = rules.name, price = %price, "price found via site whitelist");
                return Some(price);
            }
        }

        // Some domains score unreliably at the element level; their registry
        // entry turns tier 3 off entirely.
        if site.map_or(true, |rules| rules.use_scoring) {
            return self.with_scoring(document);
        }

        None
    }

    /// Tier 1: meta-style tags with price-qualifying property suffixes.
    fn from_metadata(&self, document: &Html) -> Option<String> {
        let meta = Selector::parse("meta").ok()?;

        for tag in document.select(&meta) {
            let value = tag.value();
            let Some(property) = value.attr("property").or_else(|| value.attr("name")) else {
                continue;
            };
            let content = value.attr("content").or_else(|| value.attr("value"));
            let content = match content {
                Some(c) if !c.is_empty() => c,
                _ => continue,
            };

            if self.patterns.meta_price_property.is_match(property) {
                return Some(content.to_string());
            }

            if self.patterns.meta_data_property.is_match(property)
                && self.patterns.price.is_match(content)
            {
                return Some(content.to_string());
            }
        }

        None
    }

    /// Tier 2: ordered whitelist selectors; first element whose text matches
    /// the currency+amount pattern wins, returned with whitespace removed.
    fn from_whitelist(&self, document: &Html, selectors: &[&str]) -> Option<String> {
        for selector_str in selectors {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for element in document.select(&selector) {
                let text = element_text(element);
                if !text.is_empty() && self.patterns.price.is_match(&text) {
                    return Some(self.patterns.whitespace.replace_all(&text, "").into_owned());
                }
            }
        }
        None
    }

    /// Tier 3: walk every element in document order, keep those whose
    /// whitespace-stripped text contains exactly one currency+amount match,
    /// score them, and return the winner's matched amount.
    fn with_scoring(&self, document: &Html) -> Option<String> {
        let all = Selector::parse("*").ok()?;
        let mut candidates: Vec<PriceCandidate> = Vec::new();

        for element in document.select(&all) {
            let text = element_text(element);
            if text.is_empty() {
                continue;
            }

            let no_ws = self.patterns.whitespace.replace_all(&text, "");
            let mut matches = self.patterns.price.captures_iter(&no_ws);
            let first = matches.next();
            let second = matches.next();

            // Zero matches is irrelevant, multiple matches is ambiguous.
            if let (Some(caps), None) = (first, second) {
                let Some(matched) = caps.get(1).map(|m| m.as_str().to_string()) else {
                    continue;
                };
                let index = candidates.len();
                let mut candidate = PriceCandidate {
                    element,
                    matched,
                    index,
                    score: 0.0,
                };
                candidate.score = self.score_element(&candidate, index);
                candidates.push(candidate);
            }
        }

        if candidates.is_empty() {
            return None;
        }

        // Position penalty makes ties impossible in practice, but the earlier
        // document index still wins if scores ever compare equal.
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });

        let winner = &candidates[0];
        debug!(
            price = %winner.matched,
            score = winner.score,
            candidates = candidates.len(),
            "price selected by scoring"
        );
        Some(winner.matched.clone())
    }

    fn score_element(&self, candidate: &PriceCandidate, index: usize) -> f64 {
        let patterns = &self.patterns;
        let element = candidate.element;
        let text = element_text(element);
        let no_ws = patterns.whitespace.replace_all(&text, "");
        let price = &candidate.matched;
        let mut score = 0.0;

        if patterns.mentions_price.is_match(&text) {
            score += 10.0;
        }

        if price.contains('.') {
            score += 4.0;
        }
        if price.contains(',') {
            score += 2.0;
        }
        if no_ws.chars().any(|c| ('1'..='9').contains(&c)) {
            score += 2.0;
        }

        let tag = element.value().name();
        if patterns.good_tags.is_match(tag) {
            score += 1.0;
        }

        let attr_text = class_id_text(element);
        if patterns.positive_attrs.is_match(&attr_text) {
            score += 10.0;
        }

        // Up to two ancestor levels contribute at reduced weight.
        let mut parent = element.parent().and_then(ElementRef::wrap);
        for _ in 0..2 {
            let Some(ancestor) = parent else { break };
            if patterns.positive_attrs.is_match(&class_id_text(ancestor)) {
                score += 5.0;
            }
            parent = ancestor.parent().and_then(ElementRef::wrap);
        }

        if element.value().attrs().next().is_none() {
            score -= 10.0;
        }

        if patterns.negative_attrs.is_match(&attr_text) {
            score -= 5.0;
        }

        if patterns.bad_tags.is_match(tag) {
            score -= 100.0;
        }

        if let Some(style) = element.value().attr("style") {
            let style = patterns.whitespace.replace_all(style, "").to_lowercase();
            if style.contains("display:none") {
                score -= 100.0;
            }
        }

        score -= text.len() as f64 / 100.0;
        score -= index as f64 * 0.1;

        score
    }

    /// Normalize a raw price snippet into a two-decimal numeric string, or
    /// the cleaned snippet when parsing fails.
    pub fn normalize(&self, raw: &str) -> String {
        let patterns = &self.patterns;
        let cleaned = patterns.filler_words.replace_all(raw, "");
        let cleaned = patterns.unit_suffixes.replace_all(&cleaned, "");
        let cleaned = cleaned.trim();

        let Some(numeric) = patterns.numeric.find(cleaned) else {
            return cleaned.to_string();
        };
        let mut value = numeric.as_str().to_string();

        if value.contains(',') && value.contains('.') {
            // Both separators present: comma is a thousands separator.
            value = value.replace(',', "");
        } else if value.contains(',') {
            let parts: Vec<&str> = value.split(',').collect();
            if parts.len() == 2 && parts[1].len() <= 2 {
                // Decimal comma.
                value = value.replace(',', ".");
            } else {
                value = value.replace(',', "");
            }
        }

        match Decimal::from_str(&value) {
            Ok(amount) => format!("{:.2}", amount),
            Err(_) => cleaned
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                .collect(),
        }
    }
}

/// Concatenated descendant text, outer whitespace trimmed.
fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Class and id attribute values joined for keyword matching.
fn class_id_text(element: ElementRef) -> String {
    let value = element.value();
    let class = value.attr("class").unwrap_or("");
    let id = value.attr("id").unwrap_or("");
    format!("{} {}", class, id).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scorer() -> PriceScorer {
        PriceScorer::new(Arc::new(HeuristicPatterns::new()))
    }

    #[rstest]
    #[case("1,299.50", "1299.50")]
    #[case("1,99", "1.99")]
    #[case("1,299", "1299.00")]
    #[case("£49.99", "49.99")]
    #[case("from $24.99 each", "24.99")]
    #[case("19", "19.00")]
    fn test_normalization(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(scorer().normalize(raw), expected);
    }

    #[test]
    fn test_normalization_keeps_cleaned_text_on_parse_failure() {
        // No numeric substring at all: cleaned input comes back unchanged.
        assert_eq!(scorer().normalize("call for price"), "call for price");
    }

    #[test]
    fn test_metadata_tier_short_circuits() {
        // Scenario: a price meta tag plus scoreable elements elsewhere; the
        // metadata tier must win without tier 3 running.
        let html = Html::parse_document(
            r#"<html><head>
                <meta property="product:price:amount" content="19.99">
            </head><body>
                <span class="price-current">£99.99</span>
            </body></html>"#,
        );
        let price = scorer().score_price(&html, "https://example.com/p/1");
        assert_eq!(price.as_deref(), Some("19.99"));
    }

    #[test]
    fn test_metadata_data_property_requires_price_pattern() {
        let html = Html::parse_document(
            r#"<html><head>
                <meta name="twitter:data1" content="In stock">
                <meta name="twitter:data2" content="£12.50">
            </head><body></body></html>"#,
        );
        let price = scorer().from_metadata(&html);
        assert_eq!(price.as_deref(), Some("£12.50"));
    }

    #[test]
    fn test_scoring_prefers_current_over_was_price() {
        let html = Html::parse_document(
            r#"<html><body>
                <div class="product">
                    <span class="price-current">£49.99</span>
                    <span class="price-was">£59.99</span>
                </div>
            </body></html>"#,
        );
        let price = scorer().score_price(&html, "https://example.com/p/2");
        assert_eq!(price.as_deref(), Some("49.99"));
    }

    #[test]
    fn test_scoring_penalizes_hidden_and_struck_elements() {
        let html = Html::parse_document(
            r#"<html><body>
                <del>$99.99</del>
                <span style="display: none">$89.99</span>
                <span class="sale-price">$79.99</span>
            </body></html>"#,
        );
        let price = scorer().score_price(&html, "https://example.com/p/3");
        assert_eq!(price.as_deref(), Some("79.99"));
    }

    #[test]
    fn test_disabled_scoring_yields_none() {
        // halfords carries use_scoring=false: whitelist misses leave the
        // price unresolved even with tier-3-eligible elements present.
        let html = Html::parse_document(
            r#"<html><body>
                <span class="random-thing">£19.99</span>
            </body></html>"#,
        );
        let price = scorer().score_price(&html, "https://www.halfords.com/some-product");
        assert_eq!(price, None);
    }

    #[test]
    fn test_whitelist_tier_applies_site_selectors() {
        let html = Html::parse_document(
            r#"<html><body>
                <span class="a-price"><span class="a-offscreen">£24.00</span></span>
            </body></html>"#,
        );
        let price = scorer().score_price(&html, "https://www.amazon.co.uk/dp/B000");
        assert_eq!(price.as_deref(), Some("£24.00"));
    }

    #[test]
    fn test_ambiguous_elements_are_discarded() {
        // A single element whose stripped text holds two prices is ambiguous
        // and must not become a candidate; the unambiguous one wins.
        let html = Html::parse_document(
            r#"<html><body>
                <p>$10.00 or $20.00 depending on size</p>
                <span class="price">$15.00</span>
            </body></html>"#,
        );
        let price = scorer().with_scoring(&html);
        assert_eq!(price.as_deref(), Some("15.00"));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let html = Html::parse_document(
            r#"<html><body>
                <span class="price">$12.00</span>
                <span class="amount">$13.00</span>
                <span class="cost">$14.00</span>
            </body></html>"#,
        );
        let s = scorer();
        let first = s.with_scoring(&html);
        for _ in 0..5 {
            assert_eq!(s.with_scoring(&html), first);
        }
    }

    #[test]
    fn test_no_candidates_returns_none() {
        let html = Html::parse_document("<html><body><p>hello</p></body></html>");
        assert_eq!(scorer().score_price(&html, "https://example.com"), None);
    }
}

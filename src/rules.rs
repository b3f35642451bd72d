//! Rule tables driving field extraction and price discovery.
//!
//! Everything heuristic lives here as data (selector lists, keyword patterns,
//! blocklists) so the tables can be unit-tested and tuned independently of
//! the control flow that walks them.

use regex::{Regex, RegexBuilder};

/// Per-domain override of selector lists used instead of the generic rules.
#[derive(Debug, Clone)]
pub struct SiteRuleSet {
    pub name: &'static str,
    /// Substring matched against the source URL's host.
    pub domain_fragment: &'static str,
    pub title: &'static [&'static str],
    pub price: &'static [&'static str],
    pub description: &'static [&'static str],
    /// When false, tier-3 price scoring is disabled for this domain even if
    /// the whitelist selectors found nothing.
    pub use_scoring: bool,
}

pub static SITE_RULES: &[SiteRuleSet] = &[
    SiteRuleSet {
        name: "amazon",
        domain_fragment: "amazon",
        title: &[
            "#productTitle",
            ".product-title",
            "[data-automation-id=\"product-title\"]",
            "h1.a-size-large",
            "h1 span",
        ],
        price: &[
            ".a-price-whole",
            ".a-price .a-offscreen",
            ".a-price-current",
            "#priceblock_dealprice",
            "#priceblock_ourprice",
            ".a-price-range .a-price .a-offscreen",
        ],
        description: &[
            "#feature-bullets ul",
            ".a-unordered-list.a-vertical",
            "[data-feature-name=\"featurebullets\"]",
            ".product-facts-detail",
        ],
        use_scoring: false,
    },
    SiteRuleSet {
        name: "johnlewis",
        domain_fragment: "johnlewis",
        title: &[".pdp-product-name", ".product-title", "h1[class*=\"title\"]"],
        price: &[".price", ".current-price", ".price-current"],
        description: &[
            ".pdp-product-description",
            ".product-description .c-product-details__description",
            ".c-product-details__description",
            ".product-information",
            ".product-details .content",
        ],
        use_scoring: true,
    },
    SiteRuleSet {
        name: "currys",
        domain_fragment: "currys",
        title: &[".pdp-product-name", ".product-title", "h1"],
        price: &[],
        description: &[
            ".product-description",
            ".description-content",
            ".product-info",
        ],
        use_scoring: true,
    },
    SiteRuleSet {
        name: "argos",
        domain_fragment: "argos",
        title: &[],
        price: &[".price", ".current-price", "[data-test=\"product-price\"]"],
        description: &[],
        use_scoring: true,
    },
    SiteRuleSet {
        name: "halfords",
        domain_fragment: "halfords",
        title: &[],
        price: &[
            ".price-current",
            ".current-price",
            ".price",
            "[data-testid=\"price\"]",
            ".product-price",
        ],
        description: &[],
        use_scoring: false,
    },
    SiteRuleSet {
        name: "smythstoys",
        domain_fragment: "smythstoys",
        title: &[".product-name h1", ".product-title", ".pdp-product-name"],
        price: &[
            ".price-current",
            ".current-price",
            ".product-price .price",
            "[data-testid=\"price\"]",
        ],
        description: &[
            ".product-description",
            ".product-overview",
            ".description-content",
        ],
        use_scoring: false,
    },
    SiteRuleSet {
        name: "thetoyshop",
        domain_fragment: "thetoyshop",
        title: &[".product-name", ".product-title", "h1"],
        price: &[
            ".price-current",
            ".current-price",
            ".product-price",
            "[data-price]",
            ".price .value",
        ],
        description: &[".product-description", ".product-details", ".description"],
        use_scoring: true,
    },
];

/// Look up the rule set for a host, substring match on known fragments.
pub fn site_rules_for(host: &str) -> Option<&'static SiteRuleSet> {
    let host = host.to_lowercase();
    SITE_RULES
        .iter()
        .find(|rules| host.contains(rules.domain_fragment))
}

// Generic fallback selector lists, walked in priority order.

pub static GENERIC_TITLE_SELECTORS: &[&str] = &[
    "h1[class*=\"title\"]",
    "h1[id*=\"title\"]",
    "[data-testid*=\"title\"]",
    ".product-title",
    ".product-name",
    "[class*=\"product-title\"]",
    "[class*=\"product-name\"]",
    "[itemprop=\"name\"]",
    "h1",
    "title",
];

pub static GENERIC_PRICE_SELECTORS: &[&str] = &[
    "[class*=\"price\"]:not([class*=\"original\"]):not([class*=\"was\"]):not([class*=\"msrp\"])",
    "[data-testid*=\"price\"]",
    "[class*=\"current-price\"]",
    "[class*=\"sale-price\"]",
    ".price-current",
    ".price-now",
    "[itemprop=\"price\"]",
    ".price:not(.price-original)",
    "[class*=\"cost\"]",
];

pub static GENERIC_DESCRIPTION_SELECTORS: &[&str] = &[
    "[class*=\"description\"]:not([class*=\"short\"]):not([class*=\"brief\"])",
    "[data-testid*=\"description\"]",
    ".product-description",
    ".product-details",
    "[class*=\"product-description\"]",
    "[itemprop=\"description\"]",
    ".description",
    ".details",
    "meta[name=\"description\"]",
];

pub static GENERIC_IMAGE_SELECTORS: &[&str] = &[
    ".product-image img",
    "[class*=\"hero\"] img",
    ".main-image img",
    ".primary-image img",
    "[class*=\"product-image\"] img",
    "img[alt*=\"product\"]",
    "[data-testid*=\"image\"] img",
    ".gallery img:first-of-type",
    "img:first-of-type",
];

/// Case-insensitive tokens that must appear in a fast-path body before it is
/// accepted as a product page.
pub static PRODUCT_INDICATORS: &[&str] = &["price", "add to cart", "buy now", "product", "description"];

/// Title candidates starting with these tokens are media labels, not titles.
pub static TITLE_BLOCKLIST_PREFIXES: &[&str] = &["video", "image", "hero"];

/// Currency symbol table, checked longest symbol first so "US$" wins over "$".
pub static CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("kr", "SEK"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₽", "RUB"),
];

/// Top-level-domain to currency mapping, applied to the source URL's host.
pub static TLD_CURRENCIES: &[(&str, &str)] = &[
    (".com.au", "AUD"),
    (".co.uk", "GBP"),
    (".com", "USD"),
    (".de", "EUR"),
    (".fr", "EUR"),
    (".it", "EUR"),
    (".es", "EUR"),
    (".ca", "CAD"),
    (".au", "AUD"),
    (".jp", "JPY"),
    (".in", "INR"),
    (".br", "BRL"),
    (".mx", "MXN"),
];

/// Compiled patterns shared by the extraction engine and the price scorer.
///
/// Weights and thresholds are empirically chosen; keep the exact values
/// unless a calibration run against known product pages says otherwise.
pub struct HeuristicPatterns {
    /// Currency marker followed by an amount, tolerant of HTML entities.
    pub price: Regex,
    /// Isolates the leading numeric substring of a price snippet.
    pub numeric: Regex,
    /// Explicit 3-letter currency codes.
    pub currency_code: Regex,
    /// Element text mentioning "price".
    pub mentions_price: Regex,
    /// Tags that earn a small bonus (headings, bold, span).
    pub good_tags: Regex,
    /// Tags that cannot carry a visible price.
    pub bad_tags: Regex,
    /// Positive class/id keywords.
    pub positive_attrs: Regex,
    /// Negative class/id keywords.
    pub negative_attrs: Regex,
    /// Meta property suffixes that qualify as a price.
    pub meta_price_property: Regex,
    /// Meta "dataN" properties that may carry a price.
    pub meta_data_property: Regex,
    /// Digit plus currency-like character, last-resort price test.
    pub price_like: Regex,
    /// Filler words stripped during normalization.
    pub filler_words: Regex,
    /// Unit suffixes stripped during normalization.
    pub unit_suffixes: Regex,
    /// Whitespace runs collapsed to single spaces.
    pub whitespace: Regex,
    /// Boilerplate patterns that disqualify a description candidate.
    pub description_blocklist: Vec<Regex>,
    /// Product vocabulary that qualifies a description candidate.
    pub description_vocabulary: Vec<Regex>,
}

impl HeuristicPatterns {
    pub fn new() -> Self {
        let ci = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap()
        };

        Self {
            price: ci(concat!(
                r"(?:",
                r"\$|USD|",
                r"&pound;|£|&\#163;|&\#xa3;|\u{00A3}|",
                r"&yen;|\u{FFE5}|&\#165;|&\#xa5;|\u{00A5}|",
                r"EUR|&euro;|€|&\#8364;|&\#x20ac;|",
                r"&\#8377;|\u{20B9}|",
                r"CAD|C\$|AUD|A\$|",
                r"CHF|SEK|NOK|DKK|PLN|CZK|",
                r"RUB|₽|CNY|¥|KRW|₩|",
                r"BRL|R\$|MXN|ZAR|R",
                r")\s*",
                r"(\d{1,3}(?:[,.]?\d{3})*(?:\.\d{2})?)",
            )),
            numeric: Regex::new(r"(?:\d*\.)?\d+(?:[.,]\d+)*").unwrap(),
            currency_code: ci(
                r"\b(USD|EUR|GBP|JPY|CAD|AUD|SEK|NOK|DKK|CHF|PLN|CZK|HUF|RUB|INR|CNY|KRW|BRL|MXN|ZAR)\b",
            ),
            mentions_price: ci(r"price"),
            good_tags: ci(r"^(h1|h2|h3|h4|h5|b|strong|span)$"),
            bad_tags: ci(r"^(script|style|link|meta|del|s|a)$"),
            positive_attrs: ci(r"total|price|sale|now|prc|current|cost|amount"),
            negative_attrs: ci(
                r"original|header|items|under|cart|more|nav|upsell|old|was|list|rrp|bundle|shipping|tax|vat",
            ),
            meta_price_property: ci(r":price$|:price:amount$"),
            meta_data_property: ci(r":data[12]$"),
            price_like: Regex::new(r"[\d$€£¥₹]").unwrap(),
            filler_words: ci(r"\s*(from|starting|up to|as low as|only|just)\s*"),
            unit_suffixes: ci(r"\s*(per|each|ea\.)\s*"),
            whitespace: Regex::new(r"\s+").unwrap(),
            description_blocklist: vec![
                ci(r"credit subject to"),
                ci(r"\d+\s*years?\s*\+"),
                ci(r"uk residents"),
                ci(r"t&cs? apply"),
                ci(r"terms and conditions"),
                ci(r"description.*description"),
                ci(r"^(off|selected|on)$"),
                ci(r"click to"),
                ci(r"add to basket"),
                ci(r"sign in"),
            ],
            description_vocabulary: vec![
                ci(r"\b(features?|specification|dimension|material|color|colour|size|weight)\b"),
                ci(r"\b(perfect for|ideal for|designed for|suitable for)\b"),
                ci(r"\b(includes?|comes? with|equipped with)\b"),
            ],
        }
    }
}

impl Default for HeuristicPatterns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_lookup_matches_fragment() {
        let rules = site_rules_for("www.amazon.co.uk").unwrap();
        assert_eq!(rules.name, "amazon");
        assert!(!rules.use_scoring);

        let rules = site_rules_for("www.thetoyshop.com").unwrap();
        assert_eq!(rules.name, "thetoyshop");
        assert!(rules.use_scoring);

        assert!(site_rules_for("shop.example.com").is_none());
    }

    #[test]
    fn test_site_lookup_is_case_insensitive() {
        assert!(site_rules_for("WWW.JOHNLEWIS.COM").is_some());
    }

    #[test]
    fn test_price_pattern_matches_common_forms() {
        let patterns = HeuristicPatterns::new();
        for text in ["$19.99", "£1,299.50", "EUR 45", "€9.99", "USD 1200", "₹999"] {
            assert!(patterns.price.is_match(text), "should match {text}");
        }
        assert!(!patterns.price.is_match("no money here"));
    }

    #[test]
    fn test_price_pattern_captures_amount() {
        let patterns = HeuristicPatterns::new();
        let caps = patterns.price.captures("£49.99").unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "49.99");
    }

    #[test]
    fn test_meta_property_suffixes() {
        let patterns = HeuristicPatterns::new();
        assert!(patterns.meta_price_property.is_match("product:price:amount"));
        assert!(patterns.meta_price_property.is_match("og:price"));
        assert!(!patterns.meta_price_property.is_match("og:price:currency"));
        assert!(patterns.meta_data_property.is_match("twitter:data1"));
        assert!(!patterns.meta_data_property.is_match("twitter:data3"));
    }

    #[test]
    fn test_attr_keyword_patterns() {
        let patterns = HeuristicPatterns::new();
        assert!(patterns.positive_attrs.is_match("price-current"));
        assert!(patterns.positive_attrs.is_match("checkout-total"));
        assert!(patterns.negative_attrs.is_match("price-was"));
        assert!(patterns.negative_attrs.is_match("rrp-value"));
    }

    #[test]
    fn test_description_tables() {
        let patterns = HeuristicPatterns::new();
        let blocked = "Credit subject to status. UK residents only.";
        assert!(patterns
            .description_blocklist
            .iter()
            .any(|p| p.is_match(blocked)));

        let good = "Designed for outdoor use, includes carry bag.";
        assert!(patterns
            .description_vocabulary
            .iter()
            .any(|p| p.is_match(good)));
    }

    #[test]
    fn test_symbol_table_prefers_longest() {
        // The table is ordered so multi-character symbols are checked first.
        let us_index = CURRENCY_SYMBOLS
            .iter()
            .position(|(s, _)| *s == "US$")
            .unwrap();
        let dollar_index = CURRENCY_SYMBOLS
            .iter()
            .position(|(s, _)| *s == "$")
            .unwrap();
        assert!(us_index < dollar_index);
    }
}

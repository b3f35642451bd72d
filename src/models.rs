use serde::{Deserialize, Serialize};

/// Wait condition applied to a rendered navigation, strictest first.
///
/// The browser protocol exposes a single navigated signal, so `Load` and
/// `DomContentLoaded` behave identically: both return as soon as the page
/// reports the navigation complete. `NetworkIdle` adds a short fixed settle
/// window after that signal to let late XHR-driven markup land; it is not a
/// true idle-network observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    #[serde(rename = "networkidle")]
    NetworkIdle,
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
}

impl Default for WaitCondition {
    fn default() -> Self {
        WaitCondition::NetworkIdle
    }
}

impl WaitCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitCondition::NetworkIdle => "networkidle",
            WaitCondition::Load => "load",
            WaitCondition::DomContentLoaded => "domcontentloaded",
        }
    }
}

/// Incoming scrape request, one URL per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    /// Timeout in milliseconds, clamped to 1000..=60000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub wait_for: WaitCondition,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: default_timeout_ms(),
            wait_for: WaitCondition::default(),
        }
    }

    /// Timeout clamped into the accepted range.
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.clamp(1_000, 60_000)
    }
}

/// Structured product attributes extracted from one page.
///
/// `currency` is always populated (default "USD"); `price`, when present, is
/// either a two-decimal numeric string or the cleaned original snippet when
/// numeric parsing failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub title: Option<String>,
    pub price: Option<String>,
    pub currency: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub url: String,
}

/// How a page was fetched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Network,
    Rendered,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Network => "network",
            FetchMethod::Rendered => "rendered",
        }
    }
}

/// Raw HTML plus fetch provenance, produced once per request.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub html: String,
    pub method: FetchMethod,
    pub elapsed_ms: u64,
    pub wait_condition: Option<WaitCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub timestamp: i64,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: String,
}

/// Envelope returned to the caller; scraping never surfaces raw errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProductRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

/// Pool health snapshot for the operational boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

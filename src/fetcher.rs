//! Two-tier fetch strategy: a cheap network request first, a rendered
//! browser session only when the fast path misses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use tokio_retry::strategy::{jitter, FixedInterval};
use tokio_retry::RetryIf;
use tracing::{debug, warn};
use url::Url;

use crate::browser_pool::{BrowserPool, Session};
use crate::config::ScraperConfig;
use crate::models::{FetchMethod, FetchResult, ScrapeRequest, WaitCondition};
use crate::page::{PageSource, RenderedPage};
use crate::rules::PRODUCT_INDICATORS;
use crate::utils::error::{AppError, Result};

/// Realistic desktop user agents rotated across fast-path attempts.
static USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// After the load event fires we have no network-idle signal from the
/// protocol, so late XHR-driven markup gets a fixed settle window.
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

pub struct Fetcher {
    client: reqwest::Client,
    pool: Arc<BrowserPool>,
    config: ScraperConfig,
}

impl Fetcher {
    pub fn new(config: ScraperConfig, pool: Arc<BrowserPool>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            pool,
            config,
        })
    }

    /// Fetch a page, preferring the fast path and escalating to a rendered
    /// session on any miss or failure.
    pub async fn fetch(&self, request: &ScrapeRequest) -> Result<FetchResult> {
        let started = Instant::now();
        let url = Url::parse(&request.url)
            .map_err(|_| AppError::InvalidUrl(request.url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::InvalidUrl(request.url.clone()));
        }

        match self.fetch_static(&url).await {
            Ok(Some(html)) => {
                debug!(
                    host = url.host_str().unwrap_or(""),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fast path succeeded"
                );
                return Ok(FetchResult {
                    html,
                    method: FetchMethod::Network,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    wait_condition: None,
                });
            }
            Ok(None) => debug!("fast path missed, escalating to rendered fetch"),
            Err(e) => warn!(error = %e, "fast path failed, escalating to rendered fetch"),
        }

        self.fetch_rendered(request, started).await
    }

    /// Fast path: plain GET with rotated user agent and realistic headers.
    /// Returns `Ok(None)` when the response does not pass the product-page
    /// acceptance test.
    async fn fetch_static(&self, url: &Url) -> Result<Option<String>> {
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let headers = request_headers(&host);

        // Randomized politeness delay before the outbound request.
        let delay_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.config.min_request_delay_ms..=self.config.max_request_delay_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let strategy = FixedInterval::from_millis(self.config.retry_delay_ms)
            .map(jitter)
            .take(self.config.retry_attempts as usize);

        // Only network-class failures are retried; an HTTP error status is
        // a definitive answer at this tier.
        let response = RetryIf::spawn(
            strategy,
            || {
                let request = self
                    .client
                    .get(url.clone())
                    .headers(headers.clone())
                    .header(USER_AGENT, random_user_agent());
                async move { request.send().await }
            },
            |err: &reqwest::Error| err.is_timeout() || err.is_connect(),
        )
        .await?;

        let status = response.status().as_u16();
        if status != 200 {
            debug!(status, "fast path rejected by status");
            return Ok(None);
        }

        let body = response.text().await?;
        if looks_like_product_page(status, &body) {
            Ok(Some(body))
        } else {
            debug!("fast path returned 200 without product indicators");
            Ok(None)
        }
    }

    /// Rendered path: acquire a pooled session, navigate honoring the wait
    /// condition, with a single bounded fallback to a looser condition when
    /// the strictest wait times out.
    async fn fetch_rendered(
        &self,
        request: &ScrapeRequest,
        started: Instant,
    ) -> Result<FetchResult> {
        let budget = Duration::from_millis(request.effective_timeout_ms());

        if !self.pool.is_healthy().await {
            self.pool.restart().await;
        }

        let remaining = budget
            .checked_sub(started.elapsed())
            .ok_or(AppError::NavigationTimeout(budget.as_millis() as u64))?;
        let session = tokio::time::timeout(remaining, self.pool.acquire())
            .await
            .map_err(|_| AppError::NavigationTimeout(budget.as_millis() as u64))??;

        let mut wait = request.wait_for;
        let mut fallback_used = false;
        loop {
            let remaining = budget
                .checked_sub(started.elapsed())
                .ok_or(AppError::NavigationTimeout(budget.as_millis() as u64))?;
            // The fallback attempt runs at half the remaining budget.
            let nav_budget = if fallback_used { remaining / 2 } else { remaining };

            match self.navigate(&session, &request.url, wait, nav_budget).await {
                Ok(()) => break,
                Err(e) => match fallback_condition(wait, fallback_used, &e) {
                    Some(looser) => {
                        warn!("network-idle wait timed out, retrying with load condition");
                        fallback_used = true;
                        wait = looser;
                    }
                    None => return Err(e),
                },
            }
        }

        let remaining = budget
            .checked_sub(started.elapsed())
            .ok_or(AppError::NavigationTimeout(budget.as_millis() as u64))?;
        let page = RenderedPage::new(session.tab());
        let html = tokio::time::timeout(remaining, page.content())
            .await
            .map_err(|_| AppError::NavigationTimeout(budget.as_millis() as u64))??;

        Ok(FetchResult {
            html,
            method: FetchMethod::Rendered,
            elapsed_ms: started.elapsed().as_millis() as u64,
            wait_condition: Some(wait),
        })
    }

    /// Navigation is a blocking protocol call; it runs on the blocking pool
    /// and races against the timeout budget.
    async fn navigate(
        &self,
        session: &Session,
        url: &str,
        wait: WaitCondition,
        budget: Duration,
    ) -> Result<()> {
        let tab = session.tab();
        let url = url.to_string();

        let task = tokio::task::spawn_blocking(move || -> Result<()> {
            tab.set_default_timeout(budget);
            tab.navigate_to(&url)
                .map_err(|e| AppError::Browser(format!("navigation failed: {}", e)))?;
            tab.wait_until_navigated()
                .map_err(|e| AppError::Browser(format!("page load failed: {}", e)))?;
            if wait == WaitCondition::NetworkIdle {
                std::thread::sleep(NETWORK_IDLE_SETTLE);
            }
            Ok(())
        });

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(AppError::Browser(join_err.to_string())),
            Err(_) => Err(AppError::NavigationTimeout(budget.as_millis() as u64)),
        }
    }
}

/// Decide whether a failed navigation earns a looser wait condition.
/// At most one fallback is taken per fetch, and only a timed-out
/// network-idle wait qualifies; any other failure is final.
fn fallback_condition(
    wait: WaitCondition,
    fallback_used: bool,
    error: &AppError,
) -> Option<WaitCondition> {
    let timed_out = matches!(error, AppError::NavigationTimeout(_))
        || error.to_string().to_ascii_lowercase().contains("timeout");
    if timed_out && wait == WaitCondition::NetworkIdle && !fallback_used {
        Some(WaitCondition::Load)
    } else {
        None
    }
}

/// A fast-path response is acceptable only when it is a 200 whose body
/// carries at least one product-page indicator token.
pub fn looks_like_product_page(status: u16, body: &str) -> bool {
    if status != 200 {
        return false;
    }
    let lower = body.to_ascii_lowercase();
    PRODUCT_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

fn random_user_agent() -> &'static str {
    let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

/// Baseline browsing headers plus per-domain `Referer`/`Sec-Fetch-Site`
/// overrides for hosts known to gate on them.
fn request_headers(host: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );
    headers.insert(
        reqwest::header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=0"),
    );
    headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(
            "\"Chromium\";v=\"122\", \"Not(A:Brand\";v=\"24\", \"Google Chrome\";v=\"122\"",
        ),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static("\"Linux\""),
    );

    if host.contains("amazon") {
        headers.insert(REFERER, HeaderValue::from_static("https://www.amazon.co.uk/"));
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("same-origin"),
        );
    } else if host.contains("currys") || host.contains("smythstoys") || host.contains("thetoyshop")
    {
        headers.insert(REFERER, HeaderValue::from_static("https://www.google.co.uk/"));
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("cross-site"),
        );
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserPoolConfig;

    fn test_fetcher() -> Fetcher {
        let pool = Arc::new(BrowserPool::new(BrowserPoolConfig {
            max_sessions: 1,
            chrome_path: Some("/nonexistent/chrome-binary".to_string()),
            nav_timeout_ms: 5_000,
            user_agent: "TestAgent/1.0".to_string(),
        }));
        Fetcher::new(ScraperConfig::default(), pool).unwrap()
    }

    #[test]
    fn test_acceptance_requires_indicator_token() {
        assert!(looks_like_product_page(
            200,
            "<html><span>Add to Cart</span></html>"
        ));
        assert!(looks_like_product_page(200, "Our PRICE is low"));
        assert!(!looks_like_product_page(
            200,
            "<html><body>Access denied</body></html>"
        ));
    }

    #[test]
    fn test_acceptance_requires_status_200() {
        assert!(!looks_like_product_page(404, "price product description"));
        assert!(!looks_like_product_page(403, "add to cart"));
    }

    #[test]
    fn test_amazon_headers_use_same_origin() {
        let headers = request_headers("www.amazon.co.uk");
        assert_eq!(headers[REFERER], "https://www.amazon.co.uk/");
        assert_eq!(headers["sec-fetch-site"], "same-origin");
    }

    #[test]
    fn test_known_retail_hosts_get_search_referer() {
        for host in ["www.currys.co.uk", "www.smythstoys.com", "www.thetoyshop.com"] {
            let headers = request_headers(host);
            assert_eq!(headers[REFERER], "https://www.google.co.uk/");
            assert_eq!(headers["sec-fetch-site"], "cross-site");
        }
    }

    #[test]
    fn test_unknown_host_has_no_referer() {
        let headers = request_headers("shop.example.com");
        assert!(headers.get(REFERER).is_none());
        assert_eq!(headers["sec-fetch-site"], "cross-site");
    }

    #[test]
    fn test_user_agent_rotation_stays_in_pool() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[test]
    fn test_wait_fallback_is_bounded_to_one_retry() {
        let timeout_err = AppError::NavigationTimeout(30_000);

        // First network-idle timeout falls back to the load condition.
        let looser = fallback_condition(WaitCondition::NetworkIdle, false, &timeout_err);
        assert_eq!(looser, Some(WaitCondition::Load));

        // A second timeout, with the fallback already spent, is final no
        // matter the condition in effect.
        assert_eq!(
            fallback_condition(WaitCondition::Load, true, &timeout_err),
            None
        );
        assert_eq!(
            fallback_condition(WaitCondition::NetworkIdle, true, &timeout_err),
            None
        );
    }

    #[test]
    fn test_wait_fallback_requires_network_idle() {
        let timeout_err = AppError::NavigationTimeout(30_000);
        assert_eq!(
            fallback_condition(WaitCondition::Load, false, &timeout_err),
            None
        );
        assert_eq!(
            fallback_condition(WaitCondition::DomContentLoaded, false, &timeout_err),
            None
        );
    }

    #[test]
    fn test_wait_fallback_requires_a_timeout() {
        let hard_err = AppError::Browser("tab crashed".to_string());
        assert_eq!(
            fallback_condition(WaitCondition::NetworkIdle, false, &hard_err),
            None
        );

        // Protocol-level timeouts surface as browser errors with a timeout
        // message rather than the dedicated variant.
        let protocol_timeout = AppError::Browser("navigation failed: Timeout".to_string());
        assert_eq!(
            fallback_condition(WaitCondition::NetworkIdle, false, &protocol_timeout),
            Some(WaitCondition::Load)
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_any_fetch() {
        let fetcher = test_fetcher();
        let result = fetcher.fetch(&ScrapeRequest::new("not a url")).await;
        assert!(matches!(result, Err(AppError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_non_http_scheme_is_rejected() {
        let fetcher = test_fetcher();
        let result = fetcher
            .fetch(&ScrapeRequest::new("ftp://example.com/product"))
            .await;
        assert!(matches!(result, Err(AppError::InvalidUrl(_))));
    }
}

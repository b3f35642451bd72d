//! Scraping service facade: fetch, extract, and wrap the outcome in the
//! response envelope consumed by callers.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::browser_pool::BrowserPool;
use crate::config::AppConfig;
use crate::extractor::ExtractorService;
use crate::fetcher::Fetcher;
use crate::models::{
    ErrorBody, FetchMethod, HealthStatus, ProductRecord, ResponseMetadata, ScrapeRequest,
    ScrapeResponse,
};
use crate::page::{PageSource, StaticPage};
use crate::utils::error::{AppError, Result};

pub struct ScraperService {
    fetcher: Fetcher,
    extractor: ExtractorService,
    pool: Arc<BrowserPool>,
}

impl ScraperService {
    pub fn new(config: AppConfig) -> Result<Self> {
        let pool = Arc::new(BrowserPool::new(config.browser.clone()));
        let fetcher = Fetcher::new(config.scraper.clone(), Arc::clone(&pool))?;
        Ok(Self {
            fetcher,
            extractor: ExtractorService::new(),
            pool,
        })
    }

    /// Run the full pipeline for one URL. Failures are folded into the
    /// envelope; this method never surfaces a raw error.
    pub async fn scrape(&self, request: &ScrapeRequest) -> ScrapeResponse {
        let started = Instant::now();
        info!(url = %request.url, wait = request.wait_for.as_str(), "scrape started");

        let outcome = self.scrape_inner(request).await;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((record, method)) => {
                info!(
                    url = %request.url,
                    method = method.as_str(),
                    processing_time_ms,
                    "scrape succeeded"
                );
                ScrapeResponse {
                    success: true,
                    data: Some(record),
                    error: None,
                    metadata: ResponseMetadata {
                        timestamp: Utc::now().timestamp(),
                        processing_time_ms,
                        extraction_method: Some(extraction_method(method).to_string()),
                    },
                }
            }
            Err(e) => {
                let kind = e.kind();
                info!(
                    url = %request.url,
                    code = kind.code(),
                    processing_time_ms,
                    "scrape failed"
                );
                ScrapeResponse {
                    success: false,
                    data: None,
                    error: Some(ErrorBody {
                        code: kind.code().to_string(),
                        message: kind.message().to_string(),
                        details: e.to_string(),
                    }),
                    metadata: ResponseMetadata {
                        timestamp: Utc::now().timestamp(),
                        processing_time_ms,
                        extraction_method: None,
                    },
                }
            }
        }
    }

    async fn scrape_inner(
        &self,
        request: &ScrapeRequest,
    ) -> Result<(ProductRecord, FetchMethod)> {
        let fetched = self.fetcher.fetch(request).await?;
        debug!(
            method = fetched.method.as_str(),
            elapsed_ms = fetched.elapsed_ms,
            content_length = fetched.html.len(),
            "page fetched"
        );

        let page = StaticPage::new(fetched.html);
        let record = self.extract_from_page(&page, &request.url).await?;
        Ok((record, fetched.method))
    }

    /// Extract a product record from any page source. Partial extraction is
    /// a success; only an unreadable page is an error.
    pub async fn extract_from_page(
        &self,
        page: &dyn PageSource,
        source_url: &str,
    ) -> Result<ProductRecord> {
        page.wait_for_load().await?;
        let html = page.content().await?;
        if html.trim().is_empty() {
            return Err(AppError::Scraping("page produced no content".to_string()));
        }
        Ok(self.extractor.extract(&html, source_url))
    }

    pub async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            healthy: self.pool.is_healthy().await,
            active_sessions: self.pool.active_sessions(),
            max_sessions: self.pool.max_sessions(),
        }
    }

    pub async fn restart(&self) {
        self.pool.restart().await;
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

fn extraction_method(method: FetchMethod) -> &'static str {
    match method {
        FetchMethod::Network => "hybrid-network",
        FetchMethod::Rendered => "hybrid-rendered",
    }
}

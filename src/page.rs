//! Page capability seam: extraction consumes documents through this
//! interface so live rendering sessions and pre-fetched HTML follow the
//! same code path.

use std::sync::Arc;

use async_trait::async_trait;
use headless_chrome::Tab;

use crate::utils::error::{AppError, Result};

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Suspend until the page is ready for extraction.
    async fn wait_for_load(&self) -> Result<()>;

    /// Full document markup.
    async fn content(&self) -> Result<String>;
}

/// Adapter over HTML that was already fetched; load waits are no-ops.
pub struct StaticPage {
    html: String,
}

impl StaticPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait]
impl PageSource for StaticPage {
    async fn wait_for_load(&self) -> Result<()> {
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html.clone())
    }
}

/// Adapter over a live rendering session. Browser calls block, so they are
/// offloaded to the blocking pool rather than stalling the scheduler.
pub struct RenderedPage {
    tab: Arc<Tab>,
}

impl RenderedPage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }
}

#[async_trait]
impl PageSource for RenderedPage {
    async fn wait_for_load(&self) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|e| AppError::Browser(e.to_string()))
        })
        .await
        .map_err(|e| AppError::Browser(e.to_string()))?
    }

    async fn content(&self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            tab.get_content().map_err(|e| AppError::Browser(e.to_string()))
        })
        .await
        .map_err(|e| AppError::Browser(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_page_round_trip() {
        let page = StaticPage::new("<html><body>hi</body></html>");
        page.wait_for_load().await.unwrap();
        let html = page.content().await.unwrap();
        assert!(html.contains("hi"));
    }
}

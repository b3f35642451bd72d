//! Bounded pool of headless rendering sessions.
//!
//! Capacity is enforced with a counting semaphore; the shared browser
//! process starts lazily and single-flight, and every session returns its
//! permit on drop so cancellation can never leak capacity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::BrowserPoolConfig;
use crate::utils::error::{AppError, Result};

/// Resource patterns aborted in rendering sessions; product markup never
/// needs them and they dominate page weight.
static BLOCKED_URL_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.css", "*.woff",
    "*.woff2", "*.ttf", "*.otf", "*.mp4", "*.webm", "*.mp3", "*.avi",
];

/// Script masking the automation fingerprints page scripts probe for.
static MASK_AUTOMATION_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
    });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5],
    });
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
    });
    window.chrome = { runtime: {} };
    if (navigator.permissions) {
        const originalQuery = navigator.permissions.query;
        navigator.permissions.query = (parameters) => {
            if (parameters && parameters.name === 'notifications') {
                return Promise.resolve({ state: 'default' });
            }
            if (originalQuery) {
                return originalQuery(parameters);
            }
            return Promise.resolve({ state: 'granted' });
        };
    }
"#;

/// Exclusively owned rendering session. Dropping it closes the page
/// defensively and returns exactly one permit to the pool.
pub struct Session {
    tab: Arc<Tab>,
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub fn tab(&self) -> Arc<Tab> {
        Arc::clone(&self.tab)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Tolerate already-closed tabs; the permit releases regardless.
        if let Err(e) = self.tab.close(true) {
            debug!(error = %e, "tab already closed");
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BrowserPool {
    config: BrowserPoolConfig,
    permits: Arc<Semaphore>,
    browser: Mutex<Option<Arc<Browser>>>,
    active: Arc<AtomicUsize>,
}

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig) -> Self {
        let max = config.max_sessions.max(1);
        Self {
            config,
            permits: Arc::new(Semaphore::new(max)),
            browser: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire a configured session, suspending until a slot is free and
    /// lazily starting the browser process on first use.
    pub async fn acquire(&self) -> Result<Session> {
        let permit = self.acquire_permit().await?;

        let browser = self.ensure_browser().await?;
        let user_agent = self.config.user_agent.clone();
        let nav_timeout = std::time::Duration::from_millis(self.config.nav_timeout_ms);

        // Tab creation and configuration are blocking CDP round trips.
        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::Browser(e.to_string()))?;
            tab.set_default_timeout(nav_timeout);
            configure_tab(&tab, &user_agent)?;
            Ok(tab)
        })
        .await
        .map_err(|e| AppError::Browser(e.to_string()))??;

        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(
            active = self.active.load(Ordering::SeqCst),
            max = self.config.max_sessions,
            "rendering session acquired"
        );

        Ok(Session {
            tab,
            active: Arc::clone(&self.active),
            _permit: permit,
        })
    }

    /// Single-flight browser startup: the lock is held across the launch, so
    /// callers arriving mid-initialization wait for its outcome instead of
    /// spawning duplicate processes.
    async fn ensure_browser(&self) -> Result<Arc<Browser>> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(Arc::clone(browser));
        }

        info!("launching headless browser");
        let chrome_path = self.config.chrome_path.clone();
        let browser = tokio::task::spawn_blocking(move || launch_browser(chrome_path.as_deref()))
            .await
            .map_err(|e| AppError::Browser(e.to_string()))??;

        let browser = Arc::new(browser);
        *guard = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// Whether the shared process handle is currently live.
    pub async fn is_healthy(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_sessions(&self) -> usize {
        self.config.max_sessions.max(1)
    }

    /// Tear down the process handle; the next acquire reinitializes lazily.
    pub async fn restart(&self) {
        info!("restarting browser process");
        let mut guard = self.browser.lock().await;
        *guard = None;
    }

    /// Close the process and zero the counters. Idempotent.
    pub async fn shutdown(&self) {
        let mut guard = self.browser.lock().await;
        if guard.take().is_some() {
            info!("browser process closed");
        }
        self.active.store(0, Ordering::SeqCst);
    }

    /// Take a session slot, suspending while the pool is at its ceiling.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Browser("browser pool is shut down".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

fn launch_browser(chrome_path: Option<&str>) -> Result<Browser> {
    let args = vec![
        std::ffi::OsStr::new("--no-sandbox"),
        std::ffi::OsStr::new("--disable-dev-shm-usage"),
        std::ffi::OsStr::new("--disable-gpu"),
        std::ffi::OsStr::new("--disable-extensions"),
        std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
        std::ffi::OsStr::new("--disable-background-timer-throttling"),
        std::ffi::OsStr::new("--disable-backgrounding-occluded-windows"),
        std::ffi::OsStr::new("--disable-renderer-backgrounding"),
        std::ffi::OsStr::new("--window-size=1366,768"),
    ];

    let mut launch_options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .args(args)
        .build()
        .map_err(|e| AppError::Browser(format!("failed to build launch options: {}", e)))?;

    if let Some(path) = chrome_path {
        launch_options.path = Some(std::path::PathBuf::from(path));
    }

    Browser::new(launch_options).map_err(|e| AppError::Browser(format!("failed to launch browser: {}", e)))
}

/// Baseline session configuration: user agent, realistic headers, automation
/// masking and the resource-blocking filter.
fn configure_tab(tab: &Arc<Tab>, user_agent: &str) -> Result<()> {
    tab.set_user_agent(user_agent, Some("en-US,en;q=0.9"), None)
        .map_err(|e| AppError::Browser(e.to_string()))?;

    let mut headers = HashMap::new();
    headers.insert("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8");
    headers.insert("Accept-Language", "en-US,en;q=0.9");
    headers.insert("Upgrade-Insecure-Requests", "1");
    headers.insert("Sec-Fetch-Dest", "document");
    headers.insert("Sec-Fetch-Mode", "navigate");
    headers.insert("Sec-Fetch-Site", "none");
    headers.insert("Cache-Control", "max-age=0");
    tab.set_extra_http_headers(headers)
        .map_err(|e| AppError::Browser(e.to_string()))?;

    tab.call_method(Network::SetBlockedURLs {
        urls: BLOCKED_URL_PATTERNS.iter().map(|p| p.to_string()).collect(),
    })
    .map_err(|e| AppError::Browser(e.to_string()))?;

    // Registered as an init script so it runs in every navigated document;
    // evaluating it on the blank tab would be wiped by the first navigation.
    if let Err(e) = tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: MASK_AUTOMATION_JS.to_string(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    }) {
        // Fingerprint masking is best-effort; a failed shim is not fatal.
        warn!(error = %e, "automation mask installation failed");
    }

    Ok(())
}

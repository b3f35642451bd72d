use thiserror::Error;

/// Error taxonomy reported at the service boundary.
///
/// Classification is best-effort substring/status matching; a misclassified
/// novel failure only affects the reported code, never control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    DnsError,
    ConnectionRefused,
    InvalidUrl,
    Forbidden,
    NotFound,
    RateLimited,
    BrowserError,
    ScrapingFailed,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::DnsError => "DNS_ERROR",
            ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorKind::InvalidUrl => "INVALID_URL",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::BrowserError => "BROWSER_ERROR",
            ErrorKind::ScrapingFailed => "SCRAPING_FAILED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "Request timed out while loading the page",
            ErrorKind::DnsError => "Unable to resolve domain name",
            ErrorKind::ConnectionRefused => "Server refused the connection",
            ErrorKind::InvalidUrl => "The provided URL is not valid",
            ErrorKind::Forbidden => "Access to the website was forbidden",
            ErrorKind::NotFound => "The requested page was not found",
            ErrorKind::RateLimited => "Rate limited by the target website",
            ErrorKind::BrowserError => "Browser service error",
            ErrorKind::ScrapingFailed => "Failed to scrape the provided URL",
        }
    }

    /// Classify a failure from its message text and optional HTTP status.
    pub fn classify(message: &str, status: Option<u16>) -> ErrorKind {
        let lower = message.to_lowercase();

        if let Some(code) = status {
            match code {
                403 => return ErrorKind::Forbidden,
                404 => return ErrorKind::NotFound,
                429 => return ErrorKind::RateLimited,
                _ => {}
            }
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::Timeout
        } else if lower.contains("dns")
            || lower.contains("name resolution")
            || lower.contains("err_name_not_resolved")
        {
            ErrorKind::DnsError
        } else if (lower.contains("connection") && lower.contains("refused"))
            || lower.contains("err_connection_refused")
        {
            ErrorKind::ConnectionRefused
        } else if lower.contains("invalid") && lower.contains("url") {
            ErrorKind::InvalidUrl
        } else if lower.contains("403") || lower.contains("forbidden") {
            ErrorKind::Forbidden
        } else if lower.contains("404") || lower.contains("not found") {
            ErrorKind::NotFound
        } else if lower.contains("429") || lower.contains("rate limit") {
            ErrorKind::RateLimited
        } else if lower.contains("browser") || lower.contains("chrome") {
            ErrorKind::BrowserError
        } else {
            ErrorKind::ScrapingFailed
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    #[error("Scraping error: {0}")]
    Scraping(String),
}

impl AppError {
    /// Map this error into the boundary taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            AppError::NavigationTimeout(_) => ErrorKind::Timeout,
            AppError::Http(e) => {
                if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    let status = e.status().map(|s| s.as_u16());
                    ErrorKind::classify(&e.to_string(), status)
                }
            }
            AppError::Browser(message) => {
                // Navigation failures inside the browser still classify on
                // text so DNS/refused surface with their own codes.
                let classified = ErrorKind::classify(message, None);
                if classified == ErrorKind::ScrapingFailed {
                    ErrorKind::BrowserError
                } else {
                    classified
                }
            }
            _ => ErrorKind::classify(&self.to_string(), None),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

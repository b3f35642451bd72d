pub mod browser_pool;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod page;
pub mod price_scorer;
pub mod rules;
pub mod service;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use models::{ProductRecord, ScrapeRequest, ScrapeResponse};
pub use service::ScraperService;
pub use utils::error::{AppError, ErrorKind, Result};

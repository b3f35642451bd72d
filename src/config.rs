use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub browser: BrowserPoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Per-request network timeout in seconds for the fast path.
    pub request_timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Randomized politeness delay applied before each outbound request.
    pub min_request_delay_ms: u64,
    pub max_request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserPoolConfig {
    /// Ceiling on concurrent rendering sessions.
    pub max_sessions: usize,
    pub chrome_path: Option<String>,
    pub nav_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_timeout: 30,
            retry_attempts: 2,
            retry_delay_ms: 1000,
            min_request_delay_ms: 500,
            max_request_delay_ms: 1500,
        }
    }
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 2,
            chrome_path: None,
            nav_timeout_ms: 30_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            browser: BrowserPoolConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SCRAPIEE_"
            .add_source(Environment::with_prefix("SCRAPIEE").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message(
                "Scraper request_timeout must be greater than 0".into(),
            ));
        }

        if self.scraper.min_request_delay_ms > self.scraper.max_request_delay_ms {
            return Err(ConfigError::Message(
                "Scraper min_request_delay_ms cannot exceed max_request_delay_ms".into(),
            ));
        }

        if self.browser.max_sessions == 0 {
            return Err(ConfigError::Message(
                "Browser max_sessions must be greater than 0".into(),
            ));
        }

        if self.browser.nav_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Browser nav_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.browser.user_agent.trim().is_empty() {
            return Err(ConfigError::Message(
                "Browser user_agent must not be empty".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.browser.max_sessions, 2);
        assert_eq!(config.scraper.retry_attempts, 2);
    }

    #[test]
    fn test_validation_rejects_zero_max_sessions() {
        let mut config = AppConfig::default();
        config.browser.max_sessions = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_sessions must be greater than 0"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.scraper.request_timeout = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("request_timeout must be greater than 0"));
    }

    #[test]
    fn test_validation_rejects_inverted_delay_range() {
        let mut config = AppConfig::default();
        config.scraper.min_request_delay_ms = 5000;
        config.scraper.max_request_delay_ms = 1000;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot exceed max_request_delay_ms"));
    }

    #[test]
    fn test_validation_rejects_blank_user_agent() {
        let mut config = AppConfig::default();
        config.browser.user_agent = "   ".to_string();

        assert!(config.validate().is_err());
    }
}

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use scrapiee::config::AppConfig;
use scrapiee::models::{ScrapeRequest, WaitCondition};
use scrapiee::service::ScraperService;

/// Fetch a product page and print the extracted record as JSON.
#[derive(Parser, Debug)]
#[command(name = "scrapiee", version, about)]
struct Cli {
    /// Product page URL to scrape
    url: String,

    /// Per-request timeout in milliseconds (clamped to 1000-60000)
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Wait condition for rendered navigation
    #[arg(long, default_value = "networkidle", value_parser = parse_wait_condition)]
    wait_for: WaitCondition,

    /// Pretty-print the JSON response
    #[arg(long)]
    pretty: bool,
}

fn parse_wait_condition(value: &str) -> Result<WaitCondition, String> {
    match value {
        "networkidle" => Ok(WaitCondition::NetworkIdle),
        "load" => Ok(WaitCondition::Load),
        "domcontentloaded" => Ok(WaitCondition::DomContentLoaded),
        other => Err(format!(
            "unknown wait condition '{}' (expected networkidle, load or domcontentloaded)",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scrapiee=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "configuration load failed, using defaults");
        AppConfig::default()
    });

    info!(url = %cli.url, "starting scrape");
    let service = ScraperService::new(config)?;

    let request = ScrapeRequest {
        url: cli.url,
        timeout_ms: cli.timeout_ms,
        wait_for: cli.wait_for,
    };

    let response = service.scrape(&request).await;
    let json = if cli.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", json);

    service.shutdown().await;
    Ok(())
}

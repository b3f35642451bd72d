// End-to-end pipeline: mock server -> fetch -> extraction -> envelope.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scrapiee::config::{AppConfig, BrowserPoolConfig, ScraperConfig};
use scrapiee::models::ScrapeRequest;
use scrapiee::service::ScraperService;

fn test_service() -> ScraperService {
    let config = AppConfig {
        scraper: ScraperConfig {
            request_timeout: 5,
            retry_attempts: 1,
            retry_delay_ms: 50,
            min_request_delay_ms: 0,
            max_request_delay_ms: 1,
        },
        browser: BrowserPoolConfig {
            max_sessions: 1,
            chrome_path: Some("/nonexistent/chrome-binary".to_string()),
            nav_timeout_ms: 2_000,
            user_agent: "ScrapieeTest/1.0".to_string(),
        },
    };
    ScraperService::new(config).unwrap()
}

const PRODUCT_PAGE: &str = r#"
<html>
  <head>
    <title>Stainless Steel Water Bottle - Example Outdoors</title>
  </head>
  <body>
    <h1 class="product-title">Stainless Steel Water Bottle</h1>
    <div class="product-image"><img src="/images/bottle.jpg" alt="bottle"></div>
    <span class="price-current">£24.99</span>
    <span class="price-was">£34.99</span>
    <div class="product-description">
      Double-walled vacuum insulated bottle. Keeps drinks cold for 24 hours
      and hot for 12. Includes a leak-proof sports cap and carry loop.
    </div>
  </body>
</html>
"#;

#[tokio::test]
async fn scrape_produces_full_success_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bottle"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
        .mount(&server)
        .await;

    let service = test_service();
    let mut request = ScrapeRequest::new(format!("{}/bottle", server.uri()));
    request.timeout_ms = 2_000;

    let response = service.scrape(&request).await;

    assert!(response.success);
    assert!(response.error.is_none());
    assert_eq!(
        response.metadata.extraction_method.as_deref(),
        Some("hybrid-network")
    );

    let record = response.data.unwrap();
    assert_eq!(
        record.title.as_deref(),
        Some("Stainless Steel Water Bottle")
    );
    // The current price must beat the struck-through was-price.
    assert_eq!(record.price.as_deref(), Some("24.99"));
    // The scored match carries only the amount and the mock host has no
    // TLD mapping, so currency falls back to the default.
    assert_eq!(record.currency, "USD");
    assert!(record
        .description
        .as_deref()
        .unwrap()
        .contains("vacuum insulated"));
    assert!(record.image.as_deref().unwrap().ends_with("/images/bottle.jpg"));
}

#[tokio::test]
async fn partial_extraction_is_still_a_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparse"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>Mystery Product Listing</title></head>\
             <body><p>product</p></body></html>",
        ))
        .mount(&server)
        .await;

    let service = test_service();
    let mut request = ScrapeRequest::new(format!("{}/sparse", server.uri()));
    request.timeout_ms = 2_000;

    let response = service.scrape(&request).await;

    assert!(response.success);
    let record = response.data.unwrap();
    assert!(record.price.is_none());
    assert_eq!(record.currency, "USD");
}

#[tokio::test]
async fn total_fetch_failure_produces_error_envelope() {
    let service = test_service();
    // Unroutable: fast path fails, rendered fallback has no browser.
    let mut request = ScrapeRequest::new("http://127.0.0.1:1/product");
    request.timeout_ms = 2_000;

    let response = service.scrape(&request).await;

    assert!(!response.success);
    assert!(response.data.is_none());
    let error = response.error.unwrap();
    assert!(!error.code.is_empty());
    assert!(!error.message.is_empty());
    assert!(response.metadata.processing_time_ms > 0);
}

#[tokio::test]
async fn shutdown_leaves_pool_unhealthy_and_idle() {
    let service = test_service();
    service.shutdown().await;
    let health = service.health_check().await;
    assert!(!health.healthy);
    assert_eq!(health.active_sessions, 0);
}

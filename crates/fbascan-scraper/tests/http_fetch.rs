//! `RetryingFetcher` over a real `HttpTransport` against a local `wiremock`
//! server, feeding the fetched page to a `FieldExtractor`.

use std::sync::Arc;
use std::time::Duration;

use fbascan_core::SuppliersFile;
use fbascan_scraper::{
    FetchError, FieldExtractor, HttpTransport, RateLimiter, RetryPolicy, RetryingFetcher,
};
use rust_decimal::Decimal;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUPPLIERS: &str = r#"
suppliers:
  - id: clearance-king
    item_selector: "li.product-item"
    fields:
      title:
        type: text
        required: true
        rules: [".product-title"]
      price:
        type: price
        required: true
        rules:
          - selector: ".price"
            regex: '£([\d.]+)'
      url:
        type: url
        rules:
          - selector: "a.product-link"
            attribute: href
"#;

const LISTING: &str = r#"
<html><body><ul>
  <li class="product-item">
    <a class="product-link" href="/p/mop-bucket"><span class="product-title">Mop Bucket</span></a>
    <span class="price">£4.99</span>
  </li>
  <li class="product-item">
    <a class="product-link" href="/p/sponge-10pk"><span class="product-title">Sponges x10</span></a>
    <span class="price">£1.25</span>
  </li>
</ul></body></html>
"#;

fn fetcher(max_attempts: u32) -> RetryingFetcher<HttpTransport> {
    RetryingFetcher::new(
        HttpTransport::new(5, "fbascan-test/0.1").expect("failed to build test transport"),
        Arc::new(RateLimiter::new(50, Duration::from_secs(1))),
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
            .without_jitter(),
    )
}

#[tokio::test]
async fn fetches_listing_and_extracts_products() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category/household"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(&server)
        .await;

    let url = format!("{}/category/household", server.uri());
    let page = fetcher(1).fetch(&url).await.expect("fetch should succeed");

    let config: SuppliersFile = serde_yaml::from_str(SUPPLIERS).unwrap();
    let extractor = FieldExtractor::new(config.get("clearance-king").unwrap()).unwrap();
    let extraction = extractor.extract_document(&page.body, &page.url, Some("household"));

    assert!(extraction.rejected.is_empty());
    assert_eq!(extraction.products.len(), 2);
    assert_eq!(extraction.products[0].title, "Mop Bucket");
    assert_eq!(extraction.products[0].price, Decimal::new(499, 2));
    assert_eq!(
        extraction.products[1].url.as_deref(),
        Some(format!("{}/p/sponge-10pk", server.uri()).as_str())
    );
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetcher(3)
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .expect("third attempt should succeed");
    assert_eq!(page.body, "<p>ok</p>");
}

#[tokio::test]
async fn exhausts_on_persistent_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher(3)
        .fetch(&format!("{}/down", server.uri()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::Exhausted { attempts: 3, ref last } if matches!(**last, FetchError::Status { status: 500, .. })),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(4)
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn invalid_url_is_permanent() {
    let err = fetcher(4).fetch("not a url").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl { .. }));
}

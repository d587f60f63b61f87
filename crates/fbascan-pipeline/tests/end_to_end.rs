//! A full run over HTTP: a `wiremock` supplier site, a real `HttpTransport`,
//! a JSON linking map and an on-disk catalog snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fbascan_core::{build_app_config, ConfigStore, ProductKey};
use fbascan_db::{JsonFileStore, LinkingMap, SnapshotCache};
use fbascan_pipeline::{PipelineOrchestrator, RunStage, SnapshotCatalog};
use fbascan_scraper::{HttpTransport, RetryPolicy};
use rust_decimal::Decimal;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = r#"
<html><body><ul>
  <li class="product">
    <a class="link" href="/p/spin-mop"><span class="title">Spin Mop</span></a>
    <span class="price">£15.99</span>
    <span class="ean">EAN: 5012345678900</span>
  </li>
</ul></body></html>
"#;

const CATALOG: &str = r#"[{
  "asin": "B0MOP00001",
  "ean": "5012345678900",
  "current_price": 39.99,
  "currency": "GBP",
  "sales_rank": 8200,
  "review_count": 120,
  "weight_pounds": 1.5,
  "dimensions_inches": [14.0, 9.0, 5.0]
}]"#;

fn write_config(dir: &std::path::Path, base_url: &str) -> ConfigStore {
    let system = dir.join("system.yaml");
    let suppliers = dir.join("suppliers.yaml");
    std::fs::write(&system, "system:\n  max_analyzed_products: 10\n").unwrap();
    std::fs::write(
        &suppliers,
        format!(
            r#"
suppliers:
  - id: clearance-king
    currency: GBP
    item_selector: "li.product"
    rate_limit: {{ rate: 50, per_secs: 1.0 }}
    categories:
      - name: household
        urls: ["{base_url}/household"]
    fields:
      title: {{ type: text, required: true, rules: [".title"] }}
      price: {{ type: price, required: true, rules: [".price"] }}
      ean: {{ type: ean, rules: [".ean"] }}
      url:
        type: url
        rules:
          - selector: "a.link"
            attribute: href
"#
        ),
    )
    .unwrap();

    let vars = HashMap::from([
        ("FBASCAN_SYSTEM_CONFIG_PATH", system.display().to_string()),
        ("FBASCAN_SUPPLIERS_PATH", suppliers.display().to_string()),
        ("FBASCAN_DATA_DIR", dir.display().to_string()),
    ]);
    let app = build_app_config(|key| vars.get(key).cloned().ok_or(std::env::VarError::NotPresent))
        .expect("test env should build an app config");
    ConfigStore::load(&app).expect("test config should load")
}

#[tokio::test]
async fn fresh_run_links_and_prices_one_product() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/household"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.uri());

    let catalog_dir = dir.path().join("catalog");
    std::fs::create_dir_all(&catalog_dir).unwrap();
    std::fs::write(catalog_dir.join("household.json"), CATALOG).unwrap();
    let catalog = SnapshotCatalog::load_dir(&catalog_dir).await.unwrap();

    let map_path = dir.path().join("linking_map.json");
    let store = JsonFileStore::open(&map_path).await.unwrap();
    let linking = Arc::new(LinkingMap::open(store).await.unwrap());
    assert!(linking.is_empty());

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(config),
        HttpTransport::new(5, "fbascan-test/0.1").unwrap(),
        catalog,
        Arc::clone(&linking),
        SnapshotCache::new(dir.path().join("cache"), Duration::from_secs(3600)),
    )
    .with_retry_policy(
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)).without_jitter(),
    );

    let report = orchestrator.run("clearance-king").await.unwrap();

    assert_eq!(report.stage, RunStage::Done);
    assert_eq!(report.tally.total(), 0);

    let key = ProductKey::from_raw("EAN_5012345678900");
    assert_eq!(linking.len(), 1);
    assert_eq!(linking.resolve(&key).as_deref(), Some("B0MOP00001"));

    let rows = report.rows();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.supplier_product_identifier, "EAN_5012345678900");
    assert_eq!(row.supplier_cost, Decimal::new(1599, 2));
    assert_eq!(row.marketplace_price, Some(Decimal::new(3999, 2)));
    assert!(row.roi_percent.is_some());
    assert_eq!(row.status, "analyzed");

    // The link survives a reopen of the JSON file.
    let reopened = LinkingMap::open(JsonFileStore::open(&map_path).await.unwrap())
        .await
        .unwrap();
    assert_eq!(reopened.resolve(&key).as_deref(), Some("B0MOP00001"));
}

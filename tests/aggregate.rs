mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use flex_proxy::{aggregate::gather, PageMode, Settings};
use serde_json::json;

use common::{client, Fixture};

const COLLECTIBLES: &str = "/inventory/v1/users/5/assets/collectibles";
const BADGES: &str = "/badges/v1/users/5/badges";
const HATS: &str = "/inventory/v2/users/5/inventory/8";
const GEAR: &str = "/inventory/v2/users/5/inventory/19";

fn settings(base: &str, mode: &str) -> Settings {
    let mut settings = Settings::from_yaml(&format!(
        r#"
gateway: {base}
page_mode: {mode}
resources:
  - name: user
    service: users
    path: /v1/users/{{id}}
    role: profile
  - name: collectibles
    service: inventory
    path: /v1/users/{{id}}/assets/collectibles?limit=100
    paged: true
    extract: data
    role: collectibles
  - name: badges
    service: badges
    path: /v1/users/{{id}}/badges?limit=100
    paged: true
    extract: data
    role: badges
inventory:
  categories:
    8: Hat
    19: Gear
labels:
  - label: Badge Hunter
    metric: badge_count
    min: 2
"#
    ))
    .unwrap();
    settings.max_pages = 10;
    settings
}

fn upstream() -> Fixture {
    Fixture::new()
        .json(
            "/users/v1/users/5",
            json!({ "id": 5, "created": "2015-06-01T00:00:00Z" }),
        )
        .fail(COLLECTIBLES, "", StatusCode::INTERNAL_SERVER_ERROR)
        .page(BADGES, "", json!({ "data": [{ "id": 1 }, { "id": 2 }], "nextPageCursor": "b2" }))
        .fail(BADGES, "b2", StatusCode::SERVICE_UNAVAILABLE)
        .fail(HATS, "", StatusCode::TOO_MANY_REQUESTS)
        .page(GEAR, "", json!({ "data": [{ "assetId": 7 }], "nextPageCursor": "g2" }))
        .fail(GEAR, "g2", StatusCode::BAD_GATEWAY)
}

#[tokio::test]
async fn first_page_failures_default_and_later_ones_keep_items() {
    let (base, fixture) = upstream().serve();
    let settings = Arc::new(settings(&base, "lenient"));

    let gathered = gather(&client(), settings.clone(), "5").await;

    assert!(gathered.resources[0].is_some());
    assert!(gathered.resources[1].is_none());
    assert_eq!(gathered.inventory[&8], None);
    assert!(gathered.partial.contains("badges"));
    assert!(gathered.partial_inventory.contains(&19));
    assert_eq!(fixture.hits(COLLECTIBLES), 1);
    assert_eq!(fixture.hits(BADGES), 2);

    let profile = gathered
        .assemble(&settings, "5", chrono::Utc::now())
        .unwrap();

    assert_eq!(profile["collectibles"], json!([]));
    assert_eq!(profile["collectibleCount"], 0);
    assert_eq!(profile["rap"].as_f64(), Some(0.0));
    assert_eq!(profile["badges"], json!([{ "id": 1 }, { "id": 2 }]));
    assert_eq!(profile["badgeCount"], 2);
    assert_eq!(profile["inventory"]["Hat"], json!([]));
    assert_eq!(profile["inventory"]["Gear"], json!([{ "assetId": 7 }]));
    assert_eq!(profile["labels"], json!(["Badge Hunter"]));

    assert_eq!(profile["status"]["user"], "ok");
    assert_eq!(profile["status"]["collectibles"], "failed");
    assert_eq!(profile["status"]["badges"], "partial");
    assert_eq!(profile["status"]["inventory"]["Hat"], "failed");
    assert_eq!(profile["status"]["inventory"]["Gear"], "partial");
}

#[tokio::test]
async fn strict_mode_drops_cut_listings() {
    let (base, _fixture) = upstream().serve();
    let settings = Arc::new(settings(&base, "strict"));
    assert_eq!(settings.page_mode, PageMode::Strict);

    let profile = gather(&client(), settings.clone(), "5")
        .await
        .assemble(&settings, "5", chrono::Utc::now())
        .unwrap();

    assert_eq!(profile["badges"], json!([]));
    assert_eq!(profile["badgeCount"], 0);
    assert_eq!(profile["labels"], json!([]));
    assert_eq!(profile["status"]["badges"], "failed");
    assert_eq!(profile["status"]["inventory"]["Gear"], "failed");
    assert_eq!(profile["status"]["user"], "ok");
}

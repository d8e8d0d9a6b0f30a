//! HTTP API tests driving the router directly.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{two_page_fixture, FixtureProvider};
use housefinder::api::{router, AppState, HealthResponse, ScrapeResponse, StatisticsResponse};
use housefinder::models::ListingRecord;
use housefinder::store::Store;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> (Router, Arc<Store>, Arc<FixtureProvider>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let provider = Arc::new(FixtureProvider::new(two_page_fixture()));
    let app = router(AppState::new(store.clone(), provider.clone()));
    (app, store, provider)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn post_scrape(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/scrape")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn scrape_reports_new_records_then_zero() {
    let (app, store, _) = test_app();

    let (status, body) = send(&app, post_scrape(json!({"source_key": "bj", "pages": 2}))).await;
    assert_eq!(status, StatusCode::OK);
    let first: ScrapeResponse = parse(&body);
    assert_eq!(first.data_count, 5);
    assert_eq!(first.found_count, 5);

    let (status, body) = send(&app, post_scrape(json!({"source_key": "bj", "pages": 2}))).await;
    assert_eq!(status, StatusCode::OK);
    let second: ScrapeResponse = parse(&body);
    assert_eq!(second.data_count, 0);
    assert_eq!(second.found_count, 5);

    assert_eq!(store.count().unwrap(), 5);
}

#[tokio::test]
async fn scrape_requires_source_key() {
    let (app, store, provider) = test_app();

    let (status, body) = send(&app, post_scrape(json!({"pages": 2}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = parse(&body);
    assert_eq!(error["message"], "source_key is required");

    let (status, _) = send(&app, post_scrape(json!({"source_key": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(provider.opened(), 0);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn scrape_rejects_bad_input() {
    let (app, _, _) = test_app();

    let (status, _) = send(&app, post_scrape(json!({"source_key": "bj", "pages": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_scrape(json!({"source_key": "../etc"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scrape_without_body_is_missing_source_key() {
    let (app, _, provider) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/scrape")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = parse(&body);
    assert_eq!(error["message"], "source_key is required");
    assert_eq!(provider.opened(), 0);
}

#[tokio::test]
async fn scrape_with_mistyped_fields_is_bad_request() {
    let (app, _, provider) = test_app();

    for payload in [json!({"source_key": 5}), json!({"source_key": "bj", "pages": -1})] {
        let (status, body) = send(&app, post_scrape(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: Value = parse(&body);
        assert!(error["message"].is_string());
    }

    let request = Request::builder()
        .method("POST")
        .uri("/scrape")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(provider.opened(), 0);
}

#[tokio::test]
async fn scrape_with_nothing_found_says_so() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let provider = Arc::new(FixtureProvider::new(Vec::new()));
    let app = router(AppState::new(store, provider));

    let (status, body) = send(&app, post_scrape(json!({"source_key": "sh", "pages": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    let response: ScrapeResponse = parse(&body);
    assert_eq!(response.data_count, 0);
    assert_eq!(response.found_count, 0);
    assert_eq!(response.message, "No listings found.");
}

#[tokio::test]
async fn houses_lists_every_record() {
    let (app, _, _) = test_app();

    let (_, body) = send(&app, get("/houses")).await;
    let empty: Vec<ListingRecord> = parse(&body);
    assert!(empty.is_empty());

    send(&app, post_scrape(json!({"source_key": "bj", "pages": 2}))).await;

    let (status, body) = send(&app, get("/houses")).await;
    assert_eq!(status, StatusCode::OK);
    let houses: Vec<Value> = parse(&body);
    assert_eq!(houses.len(), 5);
    assert_eq!(houses[0]["room_type"], "3室2厅");
    assert_eq!(houses[0]["price"], 560.0);
    assert!(houses[2]["price"].is_null());
    assert!(houses[0]["id"].is_i64());
}

#[tokio::test]
async fn statistics_groups_by_room_type() {
    let (app, _, _) = test_app();
    send(&app, post_scrape(json!({"source_key": "bj", "pages": 2}))).await;

    let (status, body) = send(&app, get("/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: StatisticsResponse = parse(&body);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.statistics.len(), 5);
    assert_eq!(stats.statistics["3室2厅"], 1);
    assert_eq!(stats.statistics.values().sum::<u64>(), stats.total);
}

#[tokio::test]
async fn health_reports_total_without_schedule() {
    let (app, _, _) = test_app();

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = parse(&body);
    assert_eq!(health.status, "ok");
    assert_eq!(health.total, 0);
    assert!(health.next_scheduled_run.is_none());
}

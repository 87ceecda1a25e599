//! Integration tests for API endpoints
//!
//! A server is spawned on a random port over a throwaway bolt database and
//! driven with a real HTTP client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;
use storaged::{
    api::{ApiConfig, ApiState, routes::ts::SamplePoint, spawn_api_server},
    storage::{StorageBackend, bolt::BoltBackend},
};
use tempfile::TempDir;

// Helper to create test API server
async fn spawn_test_api() -> (TempDir, SocketAddr, Arc<dyn StorageBackend>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> =
        Arc::new(BoltBackend::open(temp_dir.path().join("api.boltdb")).unwrap());

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
    };
    let addr = spawn_api_server(config, ApiState::new(storage.clone()))
        .await
        .unwrap();
    (temp_dir, addr, storage)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, addr, _) = spawn_test_api().await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "bolt");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_kv_lifecycle() {
    let (_dir, addr, _) = spawn_test_api().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v1/kv/app/greeting");

    let response = client.put(&url).body("hello world").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/octet-stream"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"hello world");

    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_key_is_bad_request() {
    let (_dir, addr, _) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{addr}/v1/kv/a//b"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_timeseries_append_and_range() {
    let (_dir, addr, _) = spawn_test_api().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v1/ts/sensors/temp");

    for value in [20.5, 21.0, 21.5] {
        let response = client
            .post(format!("{url}?value={value}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let points: Vec<SamplePoint> = response.json().await.unwrap();
    assert_eq!(
        points.iter().map(|p| p.value).collect::<Vec<_>>(),
        vec![20.5, 21.0, 21.5]
    );
    assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    // bounds are inclusive nanoseconds
    let response = client
        .get(format!(
            "{url}?from={}&to={}",
            points[1].timestamp, points[1].timestamp
        ))
        .send()
        .await
        .unwrap();
    let single: Vec<SamplePoint> = response.json().await.unwrap();
    assert_eq!(single, vec![points[1]]);

    let response = client
        .delete(format!("{url}?to={}", points[1].timestamp))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["deleted"], 2);

    let remaining: Vec<SamplePoint> = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(remaining, vec![points[2]]);
}

#[tokio::test]
async fn test_empty_range_is_empty_array() {
    let (_dir, addr, _) = spawn_test_api().await;

    let response = reqwest::get(format!("http://{addr}/v1/ts/never/written"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "[]");
}

#[tokio::test]
async fn test_reduced_range() {
    let (_dir, addr, storage) = spawn_test_api().await;
    for i in 0..200 {
        storage.add_value("dense", i as f64).await.unwrap();
    }

    let all: Vec<SamplePoint> = reqwest::get(format!("http://{addr}/v1/ts/dense"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 200);

    let (from, to) = (all[0].timestamp, all[199].timestamp);
    let reduced: Vec<SamplePoint> =
        reqwest::get(format!("http://{addr}/v1/ts/dense?from={from}&to={to}&n=5"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert!(!reduced.is_empty());
    assert!(reduced.len() <= 6, "kept {} points", reduced.len());
    assert_eq!(reduced[0], all[0]);
}

#[tokio::test]
async fn test_bad_query_parameters() {
    let (_dir, addr, _) = spawn_test_api().await;
    let client = reqwest::Client::new();

    for url in [
        format!("http://{addr}/v1/ts/series"),
        format!("http://{addr}/v1/ts/series?value=warm"),
    ] {
        let response = client.post(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{url}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    let response = client
        .get(format!("http://{addr}/v1/ts/series?from=yesterday"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

mod common;

use autodoc::server::{build_router, AppState};
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn_server(host: Arc<FakeHost>) -> String {
    let (pipeline, _cache) = pipeline_with(test_config(), FakeModel::new(), host);
    let app = build_router(AppState::new(Arc::new(pipeline)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health() {
    let base = spawn_server(FakeHost::new("abc123", sample_archive())).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_generate_then_cached() {
    let base = spawn_server(FakeHost::new("abc123", sample_archive())).await;
    let client = reqwest::Client::new();
    let payload = json!({
        "repoName": "billing",
        "workspaceName": "acme",
        "username": "admin@acme.io",
        "bitbucketToken": "secret"
    });

    let resp = client
        .post(format!("{}/generate", base))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["title"], "Docs: billing");
    assert_eq!(body["cached"], false);
    assert!(body["htmlContent"].as_str().unwrap().contains("API Details"));

    let body: Value = client
        .post(format!("{}/generate", base))
        .json(&payload)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let base = spawn_server(FakeHost::new("abc123", sample_archive())).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .header("Content-Type", "application/json")
        .body(r#"{"repoName": "billing""#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway_without_document() {
    let base = spawn_server(FakeHost::unreachable()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .json(&json!({
            "repoName": "billing",
            "workspaceName": "acme",
            "orgAdminEmail": "admin@acme.io",
            "accessToken": "wrong"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream_unavailable");
    assert!(body.get("htmlContent").is_none());
}

//! Seed scenario 1: tenants never see or resolve each other's sessions.

use std::sync::Arc;

use gateway_core::EchoSdk;

use super::common;

async fn create_session(server: &common::TestServer, api_key: &str) {
    let client = reqwest::Client::new();
    let resp = client
        .post(server.http_url("/api/v1/query"))
        .header("x-api-key", api_key)
        .json(&serde_json::json!({ "prompt": "hi" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "query failed: {}", resp.status());
}

async fn list_sessions(server: &common::TestServer, api_key: &str) -> serde_json::Value {
    let client = reqwest::Client::new();
    client
        .get(server.http_url("/api/v1/sessions"))
        .header("x-api-key", api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_owner_isolation() {
    let server = common::spawn_with_keys(Arc::new(EchoSdk), Vec::new(), "tenant-a,tenant-b").await;

    create_session(&server, "tenant-a").await;
    create_session(&server, "tenant-b").await;

    let a_listing = list_sessions(&server, "tenant-a").await;
    let a_sessions = a_listing["sessions"].as_array().unwrap();
    assert_eq!(a_sessions.len(), 1, "tenant-a should see exactly its own session");

    let b_listing = list_sessions(&server, "tenant-b").await;
    let b_sessions = b_listing["sessions"].as_array().unwrap();
    assert_eq!(b_sessions.len(), 1, "tenant-b should see exactly its own session");
    let b_id = b_sessions[0]["id"].as_str().unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .get(server.http_url(&format!("/api/v1/sessions/{b_id}")))
        .header("x-api-key", "tenant-a")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

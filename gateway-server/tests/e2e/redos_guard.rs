//! Seed scenario 6: catastrophic webhook patterns are rejected before a server can ever run
//! with them, while an ordinary matcher still drives a real webhook delivery end to end.

use std::sync::Arc;
use std::time::Duration;

use gateway_server::{MatcherError, WebhookHook, WebhookMatcher};
use tokio::time::timeout;

use super::common;

#[test]
fn catastrophic_pattern_is_rejected_at_configuration_time() {
    let err = WebhookMatcher::compile("(a+)+b", Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, MatcherError::TooComplex(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_webhook_fires_on_matching_tool() {
    let (receiver_url, mut rx) = common::spawn_webhook_receiver().await;
    let matcher = WebhookMatcher::compile("^bash$", Duration::from_millis(50)).unwrap();
    let hooks = vec![WebhookHook {
        matcher,
        url: receiver_url,
    }];

    let server = common::spawn(Arc::new(common::ToolSdk), hooks).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(server.http_url("/api/v1/query/stream"))
        .header("x-api-key", &server.api_key)
        .json(&serde_json::json!({ "prompt": "hi" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let _ = resp.text().await.unwrap();

    let received = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for webhook delivery")
        .expect("webhook receiver channel closed without a delivery");
    assert!(received.contains("bash"), "expected the dispatched tool name in the request body: {received}");
}

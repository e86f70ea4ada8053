//! Seed scenario 3: a streamed prompt's `partial` text deltas concatenate to the same text
//! the non-streaming endpoint aggregates, followed by exactly one `result` frame.

use std::sync::Arc;

use gateway_core::EchoSdk;

use super::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_sse_stream_orderliness() {
    let server = common::spawn(Arc::new(EchoSdk), Vec::new()).await;
    let client = reqwest::Client::new();

    let aggregated: serde_json::Value = client
        .post(server.http_url("/api/v1/query"))
        .header("x-api-key", &server.api_key)
        .json(&serde_json::json!({ "prompt": "Say hi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let expected_text = aggregated["text"].as_str().unwrap().to_string();

    let body = client
        .post(server.http_url("/api/v1/query/stream"))
        .header("x-api-key", &server.api_key)
        .json(&serde_json::json!({ "prompt": "Say hi" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let (events, _done) = common::parse_sse(&body);
    assert!(!events.is_empty(), "expected at least one SSE event, got none");

    let mut concatenated = String::new();
    let mut result_count = 0;
    for (kind, data) in &events {
        let value: serde_json::Value = serde_json::from_str(data).unwrap();
        match kind.as_str() {
            "partial" => {
                if let Some(text) = value["block"]["text"].as_str() {
                    concatenated.push_str(text);
                }
            }
            "result" => result_count += 1,
            _ => {}
        }
    }

    assert_eq!(concatenated, expected_text);
    assert_eq!(result_count, 1, "expected exactly one result frame");
    assert_eq!(events.last().unwrap().0, "result", "result must be the terminal frame");
}

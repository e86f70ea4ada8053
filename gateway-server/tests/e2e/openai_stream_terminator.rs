//! Seed scenario 7: the OpenAI-compatible streaming endpoint emits a stable chunk `id` across
//! every chunk and terminates with the `[DONE]` sentinel.

use std::sync::Arc;

use gateway_core::EchoSdk;

use super::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_openai_stream_terminator() {
    let server = common::spawn(Arc::new(EchoSdk), Vec::new()).await;
    let client = reqwest::Client::new();

    let body = client
        .post(server.http_url("/v1/chat/completions"))
        .header("x-api-key", &server.api_key)
        .json(&serde_json::json!({
            "model": "gpt-4",
            "messages": [{ "role": "user", "content": "Say hi" }],
            "stream": true,
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let (events, done) = common::parse_sse(&body);
    assert!(!events.is_empty(), "expected at least one chunk, got none");
    assert!(done, "stream must terminate with the [DONE] sentinel");

    let mut ids = Vec::new();
    for (_, data) in &events {
        let chunk: serde_json::Value = serde_json::from_str(data).unwrap();
        ids.push(chunk["id"].as_str().unwrap().to_string());
    }
    let first_id = &ids[0];
    assert!(ids.iter().all(|id| id == first_id), "all chunks must share the same id: {ids:?}");
}

//! Seed scenario 5: MCP server config resolves file < tenant < request, with the request's
//! explicit override winning end to end through a real SDK-bound query.

use std::sync::Arc;

use super::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_mcp_injector_precedence() {
    let sdk = Arc::new(common::RecordingSdk::default());
    let captured = sdk.captured.clone();

    let server = common::spawn_with_mcp_file(
        sdk,
        "test-key",
        "[mcp_servers.github]\ntransport = \"stdio\"\ncommand = \"file-cmd\"\n",
    )
    .await;
    let client = reqwest::Client::new();

    let created = client
        .post(server.http_url("/api/v1/mcp-servers"))
        .header("x-api-key", &server.api_key)
        .json(&serde_json::json!({
            "name": "github",
            "transport": "stdio",
            "command": "tenant-cmd",
        }))
        .send()
        .await
        .unwrap();
    assert!(created.status().is_success(), "tenant mcp-server create failed: {}", created.status());

    let resp = client
        .post(server.http_url("/api/v1/query"))
        .header("x-api-key", &server.api_key)
        .json(&serde_json::json!({
            "prompt": "hi",
            "mcp_servers": {
                "github": { "transport": "stdio", "command": "request-cmd" },
            },
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "query failed: {}", resp.status());

    let resolved = captured.lock().await.clone().expect("sdk should have recorded a request");
    assert_eq!(resolved.len(), 1, "only the one configured server should be present");
    let github = resolved.get("github").expect("github entry present");
    assert_eq!(github.command(), Some("request-cmd"), "request tier must win over tenant and file tiers");
}

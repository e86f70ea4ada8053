//! Seed scenario 4: interrupting mid-run over the WS protocol ends the run with
//! `stop_reason=interrupted` instead of running to natural completion.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use super::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_interrupt() {
    let step = Duration::from_millis(150);
    let server = common::spawn(Arc::new(common::PacedSdk { step }), Vec::new()).await;
    let (mut write, mut read) = common::connect_ws(&server, "/api/v1/query/ws").await;

    let prompt = serde_json::json!({
        "type": "prompt",
        "prompt": "one two three four five",
    });
    write.send(Message::Text(prompt.to_string())).await.unwrap();

    // Init, then the first partial — both native WS frames are plain `Event` JSON.
    let init = timeout(Duration::from_secs(5), read.next()).await.unwrap().unwrap().unwrap();
    let init: serde_json::Value = serde_json::from_str(init.to_text().unwrap()).unwrap();
    assert_eq!(init["type"], "init");

    let first_partial = timeout(Duration::from_secs(5), read.next()).await.unwrap().unwrap().unwrap();
    let first_partial: serde_json::Value = serde_json::from_str(first_partial.to_text().unwrap()).unwrap();
    assert_eq!(first_partial["type"], "partial");

    write
        .send(Message::Text(serde_json::json!({ "type": "interrupt" }).to_string()))
        .await
        .unwrap();

    // The run may still emit the partial already in flight before observing the interrupt;
    // drain until the terminal `result` arrives.
    let result = loop {
        let msg = timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timed out waiting for result after interrupt")
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        if value["type"] == "result" {
            break value;
        }
    };

    assert_eq!(result["stop_reason"], "interrupted");
}

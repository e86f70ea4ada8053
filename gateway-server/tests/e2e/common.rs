//! Shared e2e harness: spawns a real gateway on an OS-assigned port via
//! [`gateway_server::run_serve_on_listener`] and hands back a client-facing handle.
//!
//! `AppConfig::from_env` reads process-wide environment variables, so every spawn takes
//! `ENV_LOCK` for its duration — tests in this binary run one server at a time, never racing
//! each other's env mutations.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::{AgentSdk, GatewayError, PermissionMode, SdkRequest, SdkSession};
use gateway_protocol::{Event, PartialBlock, PermissionDecision, StopReason, Usage};
use gateway_server::WebhookHook;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use uuid::Uuid;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub struct TestServer {
    base_url: String,
    pub api_key: String,
    _guard: MutexGuard<'static, ()>,
    _db: tempfile::NamedTempFile,
    handle: tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.base_url.trim_start_matches("http://"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a server with a single tenant key `"test-key"`.
pub async fn spawn(sdk: Arc<dyn AgentSdk>, webhooks: Vec<WebhookHook>) -> TestServer {
    spawn_with_keys(sdk, webhooks, "test-key").await
}

/// Spawns a server whose tenant keys are `api_keys` (comma-separated); `TestServer::api_key`
/// is set to the first one.
#[allow(clippy::await_holding_lock)]
pub async fn spawn_with_keys(sdk: Arc<dyn AgentSdk>, webhooks: Vec<WebhookHook>, api_keys: &str) -> TestServer {
    let guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let db = tempfile::NamedTempFile::new().unwrap();

    std::env::set_var("GATEWAY_API_KEYS", api_keys);
    std::env::set_var("GATEWAY_DURABLE_URL", format!("sqlite://{}", db.path().display()));
    std::env::set_var("GATEWAY_MCP_CONFIG_FILE", "/nonexistent/gateway-e2e-mcp.toml");
    std::env::set_var("GATEWAY_EVENT_QUEUE_CAPACITY", "32");
    std::env::set_var("GATEWAY_SLOW_CLIENT_CUTOFF_SECS", "30");
    std::env::set_var("GATEWAY_PERMISSION_REQUEST_TIMEOUT_SECS", "5");
    std::env::remove_var("GATEWAY_MCP_CONFIG_STRICT");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(gateway_server::run_serve_on_listener(listener, sdk, webhooks));

    let api_key = api_keys.split(',').next().unwrap().trim().to_string();
    TestServer {
        base_url: format!("http://{addr}"),
        api_key,
        _guard: guard,
        _db: db,
        handle,
    }
}

/// Spawns a server whose MCP config file tier is pre-populated with `toml_contents`. The
/// file lives under the OS temp dir for the rest of the process (McpConfigLoader caches its
/// contents on first read, so a `NamedTempFile`'s drop-on-scope-exit would race that read).
#[allow(clippy::await_holding_lock)]
pub async fn spawn_with_mcp_file(sdk: Arc<dyn AgentSdk>, api_keys: &str, toml_contents: &str) -> TestServer {
    let guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let db = tempfile::NamedTempFile::new().unwrap();
    let mcp_path = std::env::temp_dir().join(format!("gateway-e2e-mcp-{}.toml", Uuid::new_v4()));
    std::fs::write(&mcp_path, toml_contents).unwrap();

    std::env::set_var("GATEWAY_API_KEYS", api_keys);
    std::env::set_var("GATEWAY_DURABLE_URL", format!("sqlite://{}", db.path().display()));
    std::env::set_var("GATEWAY_MCP_CONFIG_FILE", &mcp_path);
    std::env::set_var("GATEWAY_EVENT_QUEUE_CAPACITY", "32");
    std::env::set_var("GATEWAY_SLOW_CLIENT_CUTOFF_SECS", "30");
    std::env::set_var("GATEWAY_PERMISSION_REQUEST_TIMEOUT_SECS", "5");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(gateway_server::run_serve_on_listener(listener, sdk, Vec::new()));

    let api_key = api_keys.split(',').next().unwrap().trim().to_string();
    TestServer {
        base_url: format!("http://{addr}"),
        api_key,
        _guard: guard,
        _db: db,
        handle,
    }
}

/// Connects a WS client to `path`, authenticating with `server.api_key`.
pub async fn connect_ws(
    server: &TestServer,
    path: &str,
) -> (
    futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        tokio_tungstenite::tungstenite::Message,
    >,
    futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
) {
    use futures_util::StreamExt;

    let mut request = server.ws_url(path).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-api-key", server.api_key.parse().unwrap());
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    ws.split()
}

/// A one-shot raw HTTP receiver: accepts a single connection, hands its request text back
/// over `rx`, and replies `200 OK`. Good enough to observe whether a webhook POST fired.
pub async fn spawn_webhook_receiver() -> (String, tokio::sync::mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                if let Ok(Ok(n)) = tokio::time::timeout(Duration::from_secs(2), socket.read(&mut buf)).await {
                    let text = String::from_utf8_lossy(&buf[..n]).to_string();
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                        .await;
                    let _ = tx.send(text).await;
                }
            });
        }
    });
    (format!("http://{addr}"), rx)
}

/// Splits a raw SSE response body into `(event, data)` pairs, skipping the trailing `[DONE]`
/// sentinel (returned separately via `done`).
pub fn parse_sse(body: &str) -> (Vec<(String, String)>, bool) {
    let mut events = Vec::new();
    let mut done = false;
    for block in body.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }
        let mut kind = String::new();
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event: ") {
                kind = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("data: ") {
                data = rest.to_string();
            }
        }
        if data == "[DONE]" {
            done = true;
            continue;
        }
        if !data.is_empty() {
            events.push((kind, data));
        }
    }
    (events, done)
}

/// Echoes the prompt back word by word, same shape as `gateway_core::EchoSdk`, but each
/// implementation here also lets tests observe or pace the run.
struct EchoLikeSession {
    session_id: Uuid,
    words: std::vec::IntoIter<String>,
    done: bool,
}

#[async_trait]
impl SdkSession for EchoLikeSession {
    async fn next_event(&mut self) -> Option<Event> {
        if self.session_id != Uuid::nil() {
            let id = self.session_id;
            self.session_id = Uuid::nil();
            return Some(Event::Init { session_id: id });
        }
        if let Some(word) = self.words.next() {
            return Some(Event::Partial {
                index: 0,
                block: PartialBlock::TextDelta {
                    text: format!("{word} "),
                },
            });
        }
        if !self.done {
            self.done = true;
            return Some(Event::Result {
                stop_reason: StopReason::Completed,
                usage: Usage::default(),
                cost: Some(0.0),
            });
        }
        None
    }

    async fn interrupt(&mut self) {
        self.words = Vec::new().into_iter();
    }

    async fn answer(&mut self, _tool_use_id: String, _decision: PermissionDecision) {}
}

/// An `AgentSdk` that records the `mcp_servers` map of the last request it started, so tests
/// can assert on the resolved three-tier injection without the SDK needing to understand it.
#[derive(Clone, Default)]
pub struct RecordingSdk {
    pub captured: Arc<tokio::sync::Mutex<Option<gateway_mcp::ServerMap>>>,
}

#[async_trait]
impl AgentSdk for RecordingSdk {
    async fn start(&self, request: SdkRequest) -> Result<Box<dyn SdkSession>, GatewayError> {
        *self.captured.lock().await = Some(request.mcp_servers.clone());
        let words: Vec<String> = request.prompt.split_whitespace().map(str::to_string).collect();
        Ok(Box::new(EchoLikeSession {
            session_id: Uuid::new_v4(),
            words: words.into_iter(),
            done: false,
        }))
    }
}

/// Like `EchoSdk`, but each event after `Init` waits `step` first, giving a concurrent
/// `interrupt()` caller a window to land mid-run.
pub struct PacedSdk {
    pub step: Duration,
}

struct PacedSession {
    session_id: Uuid,
    words: std::vec::IntoIter<String>,
    done: bool,
    step: Duration,
}

#[async_trait]
impl SdkSession for PacedSession {
    async fn next_event(&mut self) -> Option<Event> {
        if self.session_id != Uuid::nil() {
            let id = self.session_id;
            self.session_id = Uuid::nil();
            return Some(Event::Init { session_id: id });
        }
        tokio::time::sleep(self.step).await;
        if let Some(word) = self.words.next() {
            return Some(Event::Partial {
                index: 0,
                block: PartialBlock::TextDelta {
                    text: format!("{word} "),
                },
            });
        }
        if !self.done {
            self.done = true;
            return Some(Event::Result {
                stop_reason: StopReason::Completed,
                usage: Usage::default(),
                cost: Some(0.0),
            });
        }
        None
    }

    async fn interrupt(&mut self) {
        self.words = Vec::new().into_iter();
    }

    async fn answer(&mut self, _tool_use_id: String, _decision: PermissionDecision) {}
}

#[async_trait]
impl AgentSdk for PacedSdk {
    async fn start(&self, request: SdkRequest) -> Result<Box<dyn SdkSession>, GatewayError> {
        let words: Vec<String> = request.prompt.split_whitespace().map(str::to_string).collect();
        Ok(Box::new(PacedSession {
            session_id: Uuid::new_v4(),
            words: words.into_iter(),
            done: false,
            step: self.step,
        }))
    }
}

/// Emits one `tool_start`/`tool_end` pair before completing, so webhook dispatch has something
/// to fire on.
pub struct ToolSdk;

struct ToolSession {
    session_id: Uuid,
    stage: u8,
}

#[async_trait]
impl SdkSession for ToolSession {
    async fn next_event(&mut self) -> Option<Event> {
        self.stage += 1;
        match self.stage {
            1 => Some(Event::Init {
                session_id: self.session_id,
            }),
            2 => Some(Event::ToolStart {
                tool_use_id: "t1".into(),
                tool_name: "bash".into(),
                input: serde_json::Value::Null,
            }),
            3 => Some(Event::ToolEnd {
                tool_use_id: "t1".into(),
            }),
            4 => Some(Event::Result {
                stop_reason: StopReason::Completed,
                usage: Usage::default(),
                cost: Some(0.0),
            }),
            _ => None,
        }
    }

    async fn interrupt(&mut self) {}
    async fn answer(&mut self, _tool_use_id: String, _decision: PermissionDecision) {}
}

#[async_trait]
impl AgentSdk for ToolSdk {
    async fn start(&self, _request: SdkRequest) -> Result<Box<dyn SdkSession>, GatewayError> {
        Ok(Box::new(ToolSession {
            session_id: Uuid::new_v4(),
            stage: 0,
        }))
    }
}

#[allow(dead_code)]
pub fn default_permission_mode() -> PermissionMode {
    PermissionMode::Default
}

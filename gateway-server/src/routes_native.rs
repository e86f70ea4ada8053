//! Native `/api/v1/*` routes (spec §6): query submission (sync/SSE/WS), session CRUD and
//! checkpoints, and per-tenant MCP server config management.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use gateway_core::{AgentRunner, PermissionMode, SdkRequest};
use gateway_mcp::{inject, McpServerEntry, RequestOverride, ServerMap};
use gateway_protocol::{Event, PermissionDecision};
use gateway_store::{Checkpoint, Session, SessionFilters, SessionMode, SessionPatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Owner;
use crate::error::{validation, NativeError};
use crate::interrupt::{InboundMessageKind, InterruptController, Transition};
use crate::sink::{CoalescingQueue, QueueWriter};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/query", post(query))
        .route("/api/v1/query/stream", post(query_stream))
        .route("/api/v1/query/ws", get(query_ws))
        .route("/api/v1/sessions", get(list_sessions))
        .route(
            "/api/v1/sessions/:id",
            get(get_session).patch(patch_session).delete(delete_session),
        )
        .route("/api/v1/sessions/:id/fork", post(fork_session))
        .route("/api/v1/sessions/:id/resume", post(resume_session))
        .route("/api/v1/sessions/:id/checkpoints", get(list_checkpoints))
        .route(
            "/api/v1/mcp-servers",
            get(list_mcp_servers).post(create_mcp_server),
        )
        .route(
            "/api/v1/mcp-servers/:name",
            get(get_mcp_server).put(put_mcp_server).delete(delete_mcp_server),
        )
        .route("/api/v1/mcp-servers/share", post(share_mcp_server))
        .route("/api/v1/mcp-servers/share/:token", get(resolve_mcp_share))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    prompt: String,
    session_id: Option<String>,
    model: Option<String>,
    max_turns: Option<u32>,
    #[serde(default)]
    allowed_tools: Vec<String>,
    #[serde(default)]
    disallowed_tools: Vec<String>,
    #[serde(default)]
    permission_mode: Option<String>,
    #[serde(default)]
    mcp_servers: Option<Value>,
    cwd: Option<String>,
    #[serde(default)]
    images: Vec<Value>,
    #[serde(default)]
    agents: Vec<Value>,
    #[serde(default)]
    stream: bool,
}

fn parse_permission_mode(raw: Option<&str>) -> Result<PermissionMode, NativeError> {
    match raw.unwrap_or("default") {
        "default" => Ok(PermissionMode::Default),
        "acceptEdits" => Ok(PermissionMode::AcceptEdits),
        "plan" => Ok(PermissionMode::Plan),
        "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
        other => Err(NativeError(validation(format!(
            "unknown permission_mode {other:?}"
        )))),
    }
}

fn parse_request_override(value: Option<Value>) -> Result<RequestOverride, NativeError> {
    match value {
        None | Some(Value::Null) => Ok(RequestOverride::Unset),
        Some(Value::Object(map)) if map.is_empty() => Ok(RequestOverride::EmptyMap),
        Some(Value::Object(map)) => {
            let mut servers = ServerMap::new();
            for (name, entry) in map {
                let entry: McpServerEntry = serde_json::from_value(entry)
                    .map_err(|e| NativeError(validation(format!("invalid mcp_servers.{name}: {e}"))))?;
                servers.insert(name, entry);
            }
            Ok(RequestOverride::Explicit(servers))
        }
        Some(_) => Err(NativeError(validation("mcp_servers must be a map, {}, or null"))),
    }
}

fn tenant_server_map(entries: Vec<(String, McpServerEntry)>) -> ServerMap {
    entries.into_iter().collect::<BTreeMap<_, _>>()
}

async fn resolve_server_map(
    state: &AppState,
    owner: &str,
    override_value: Option<Value>,
) -> Result<ServerMap, NativeError> {
    let (file_map, _diagnostics) = state.mcp_loader.load();
    let tenant_entries = state
        .mcp_store
        .list(owner)
        .await
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)?;
    let tenant_map = tenant_server_map(tenant_entries);
    let request_override = parse_request_override(override_value)?;
    Ok(inject(&file_map, &tenant_map, &request_override))
}

async fn build_sdk_request(
    state: &AppState,
    owner: &str,
    req: &QueryRequest,
    session_id: &str,
) -> Result<SdkRequest, NativeError> {
    let mcp_servers = resolve_server_map(state, owner, req.mcp_servers.clone()).await?;
    let permission_mode = parse_permission_mode(req.permission_mode.as_deref())?;
    Ok(SdkRequest {
        session_id: session_id.to_string(),
        prompt: req.prompt.clone(),
        model: req.model.clone().unwrap_or_else(|| "claude-default".to_string()),
        max_turns: req.max_turns,
        allowed_tools: req.allowed_tools.clone(),
        disallowed_tools: req.disallowed_tools.clone(),
        permission_mode,
        mcp_servers,
        working_directory: req.cwd.clone(),
        images: req.images.clone(),
        agents: req.agents.clone(),
    })
}

async fn open_session(
    state: &AppState,
    owner: &str,
    req: &QueryRequest,
) -> Result<Session, NativeError> {
    if req.prompt.len() > state.config.max_prompt_length_bytes {
        return Err(NativeError(validation("prompt exceeds max_prompt_length_bytes")));
    }
    match &req.session_id {
        Some(id) => state
            .sessions
            .get(id, owner)
            .await
            .map_err(gateway_core::GatewayError::from)
            .map_err(NativeError),
        None => state
            .sessions
            .create(
                owner,
                req.model.as_deref().unwrap_or("claude-default"),
                req.cwd.clone(),
                None,
                SessionMode::Code,
            )
            .await
            .map_err(gateway_core::GatewayError::from)
            .map_err(NativeError),
    }
}

async fn record_turn(state: &AppState, owner: &str, session_id: &str, cost: Option<f64>) {
    let patch = SessionPatch {
        total_turns_delta: Some(1),
        total_cost_delta: cost,
        ..Default::default()
    };
    if let Err(err) = state.sessions.update(session_id, owner, patch).await {
        tracing::warn!(session_id, error = ?err, "failed to record turn accounting");
    }
}

async fn query(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, NativeError> {
    let session = open_session(&state, &owner, &req).await?;
    let sdk_request = build_sdk_request(&state, &owner, &req, &session.id).await?;
    let sdk_session = state.sdk.start(sdk_request).await.map_err(NativeError)?;
    let runner = AgentRunner::new(sdk_session, state.config.permission_request_timeout);

    if req.stream {
        return Ok(stream_response(state, owner, session.id, runner).await);
    }

    let response = runner.invoke().await.map_err(NativeError)?;
    record_turn(&state, &owner, &session.id, response.cost).await;
    Ok(Json(serde_json::json!({
        "session_id": response.session_id,
        "text": response.text,
        "stop_reason": response.stop_reason,
        "usage": response.usage,
        "cost": response.cost,
    }))
    .into_response())
}

async fn query_stream(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, NativeError> {
    let session = open_session(&state, &owner, &req).await?;
    let sdk_request = build_sdk_request(&state, &owner, &req, &session.id).await?;
    let sdk_session = state.sdk.start(sdk_request).await.map_err(NativeError)?;
    let runner = AgentRunner::new(sdk_session, state.config.permission_request_timeout);
    Ok(stream_response(state, owner, session.id, runner).await)
}

/// Runs `runner` to completion, fanning its events through a [`CoalescingQueue`] into one SSE
/// response (spec §4.7). Turn accounting is recorded once the terminal event is observed.
async fn stream_response(
    state: Arc<AppState>,
    owner: String,
    session_id: String,
    runner: Arc<AgentRunner>,
) -> Response {
    let queue = CoalescingQueue::new(state.config.event_queue_capacity, state.config.slow_client_cutoff);
    let writer = QueueWriter(queue.clone());
    let closer = queue.clone();
    tokio::spawn(async move {
        if let Err(err) = runner.run(writer).await {
            tracing::warn!(error = ?err, "agent run ended with error");
        }
        closer.close();
    });

    let sse_stream = async_stream::stream! {
        while let Some(sequenced) = queue.recv().await {
            if let Event::Result { cost, .. } = &sequenced.event {
                record_turn(&state, &owner, &session_id, *cost).await;
            }
            if let Event::ToolStart { tool_name, .. } = &sequenced.event {
                state.webhooks.dispatch(&session_id, tool_name).await;
            }
            let terminal = sequenced.event.is_terminal();
            let kind = event_kind(&sequenced.event);
            match sequenced.event.to_value() {
                Ok(body) => yield Ok::<_, std::convert::Infallible>(SseEvent::default().event(kind).data(body.to_string())),
                Err(err) => tracing::warn!(error = %err, "failed to serialize event for SSE"),
            }
            if terminal {
                break;
            }
        }
    };

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text(""))
        .into_response()
}

fn event_kind(event: &Event) -> &'static str {
    match event {
        Event::Init { .. } => "init",
        Event::Partial { .. } => "partial",
        Event::Message { .. } => "message",
        Event::ToolStart { .. } => "tool_start",
        Event::ToolEnd { .. } => "tool_end",
        Event::ToolResult { .. } => "tool_result",
        Event::PermissionRequest { .. } => "permission_request",
        Event::Result { .. } => "result",
        Event::Error { .. } => "error",
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Prompt(Box<QueryRequest>),
    Interrupt,
    Answer {
        tool_use_id: String,
        decision: PermissionDecision,
    },
}

async fn query_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, owner))
}

/// One WebSocket connection's lifetime (spec §4.8): at most one `AgentRunner` active at a
/// time, driven by `InterruptController`'s state machine.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, owner: String) {
    let mut controller = InterruptController::new(5);
    let mut active: Option<(Arc<AgentRunner>, Arc<CoalescingQueue>, String)> = None;

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else { break };
                let Message::Text(text) = message else { continue };
                let Ok(client_message) = serde_json::from_str::<ClientMessage>(&text) else {
                    let _ = socket
                        .send(Message::Text(serde_json::json!({"type": "error", "message": "malformed message"}).to_string()))
                        .await;
                    continue;
                };
                let kind = match &client_message {
                    ClientMessage::Prompt(_) => InboundMessageKind::Prompt,
                    ClientMessage::Interrupt => InboundMessageKind::Interrupt,
                    ClientMessage::Answer { .. } => InboundMessageKind::Answer,
                };
                match controller.on_message(kind) {
                    Transition::ProtocolViolation => break,
                    Transition::Invalid { message } => {
                        let _ = socket
                            .send(Message::Text(serde_json::json!({"type": "error", "message": message}).to_string()))
                            .await;
                        continue;
                    }
                    Transition::Accepted(_) => {}
                }
                match client_message {
                    ClientMessage::Prompt(req) => {
                        let Ok(session) = open_session(&state, &owner, &req).await else { continue };
                        let Ok(sdk_request) = build_sdk_request(&state, &owner, &req, &session.id).await else { continue };
                        let Ok(sdk_session) = state.sdk.start(sdk_request).await else { continue };
                        let runner = AgentRunner::new(sdk_session, state.config.permission_request_timeout);
                        let queue = CoalescingQueue::new(state.config.event_queue_capacity, state.config.slow_client_cutoff);
                        let writer = QueueWriter(queue.clone());
                        let closer = queue.clone();
                        let run_handle = runner.clone();
                        tokio::spawn(async move {
                            let _ = run_handle.run(writer).await;
                            closer.close();
                        });
                        active = Some((runner, queue, session.id));
                    }
                    ClientMessage::Interrupt => {
                        if let Some((runner, _, _)) = &active {
                            runner.interrupt().await;
                        }
                    }
                    ClientMessage::Answer { tool_use_id, decision } => {
                        if let Some((runner, _, _)) = &active {
                            runner.answer(tool_use_id, decision).await;
                        }
                    }
                }
            }
            Some(sequenced) = async {
                match &active {
                    Some((_, queue, _)) => queue.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                let terminal = sequenced.event.is_terminal();
                if let (Event::ToolStart { tool_name, .. }, Some((_, _, session_id))) = (&sequenced.event, &active) {
                    state.webhooks.dispatch(session_id, tool_name).await;
                }
                if let Ok(body) = serde_json::to_string(&sequenced.event) {
                    if socket.send(Message::Text(body)).await.is_err() {
                        break;
                    }
                }
                if terminal {
                    if let (Event::Result { cost, .. }, Some((_, _, session_id))) = (&sequenced.event, &active) {
                        record_turn(&state, &owner, session_id, *cost).await;
                    }
                    controller.on_runner_terminal();
                    active = None;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionListQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
    mode: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    search: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
struct SessionListResponse {
    sessions: Vec<Session>,
    total: u64,
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<SessionListResponse>, NativeError> {
    let mode = match query.mode.as_deref() {
        Some("brainstorm") => Some(SessionMode::Brainstorm),
        Some("code") => Some(SessionMode::Code),
        Some(other) => return Err(NativeError(validation(format!("unknown mode {other:?}")))),
        None => None,
    };
    let filters = SessionFilters {
        mode,
        tags: query.tags,
        search: query.search,
    };
    let (sessions, total) = state
        .sessions
        .list(&owner, query.page, query.page_size, filters)
        .await
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)?;
    Ok(Json(SessionListResponse { sessions, total }))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<Session>, NativeError> {
    state
        .sessions
        .get(&id, &owner)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

#[derive(Debug, Deserialize, Default)]
struct PatchSessionRequest {
    status: Option<String>,
    metadata: Option<std::collections::HashMap<String, Value>>,
    tags: Option<std::collections::BTreeSet<String>>,
}

async fn patch_session(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<String>,
    Json(body): Json<PatchSessionRequest>,
) -> Result<Json<Session>, NativeError> {
    let status = match body.status.as_deref() {
        Some("active") => Some(gateway_store::SessionStatus::Active),
        Some("completed") => Some(gateway_store::SessionStatus::Completed),
        Some("error") => Some(gateway_store::SessionStatus::Error),
        Some(other) => return Err(NativeError(validation(format!("unknown status {other:?}")))),
        None => None,
    };
    let patch = SessionPatch {
        status,
        metadata: body.metadata,
        tags: body.tags,
        ..Default::default()
    };
    state
        .sessions
        .update(&id, &owner, patch)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, NativeError> {
    state
        .sessions
        .delete(&id, &owner)
        .await
        .map(|_| axum::http::StatusCode::NO_CONTENT)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

#[derive(Debug, Deserialize)]
struct ForkRequest {
    checkpoint_index: u64,
}

async fn fork_session(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<String>,
    Json(body): Json<ForkRequest>,
) -> Result<Json<Session>, NativeError> {
    state
        .sessions
        .fork(&id, &owner, body.checkpoint_index)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

async fn resume_session(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<Session>, NativeError> {
    state
        .sessions
        .resume(&id, &owner)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Checkpoint>>, NativeError> {
    state
        .sessions
        .checkpoint_list(&id, &owner)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

#[derive(Debug, Serialize)]
struct McpServerListEntry {
    name: String,
    #[serde(flatten)]
    entry: McpServerEntry,
}

async fn list_mcp_servers(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Result<Json<Vec<McpServerListEntry>>, NativeError> {
    let entries = state
        .mcp_store
        .list(&owner)
        .await
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)?;
    Ok(Json(
        entries
            .into_iter()
            .map(|(name, entry)| McpServerListEntry { name, entry })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct CreateMcpServerRequest {
    name: String,
    #[serde(flatten)]
    entry: McpServerEntry,
}

fn validate_tenant_entry(entry: &McpServerEntry) -> Result<(), NativeError> {
    gateway_mcp::validate(entry, gateway_mcp::ConfigTier::Tenant)
        .map_err(|e| NativeError(validation(format!("{}: {}", e.field_path, e.reason))))
}

async fn create_mcp_server(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(req): Json<CreateMcpServerRequest>,
) -> Result<Json<McpServerEntry>, NativeError> {
    validate_tenant_entry(&req.entry)?;
    state
        .mcp_store
        .put(&owner, &req.name, req.entry)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

async fn get_mcp_server(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(name): Path<String>,
) -> Result<Json<McpServerEntry>, NativeError> {
    state
        .mcp_store
        .get(&owner, &name)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

async fn put_mcp_server(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(name): Path<String>,
    Json(entry): Json<McpServerEntry>,
) -> Result<Json<McpServerEntry>, NativeError> {
    validate_tenant_entry(&entry)?;
    state
        .mcp_store
        .put(&owner, &name, entry)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

async fn delete_mcp_server(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(name): Path<String>,
) -> Result<axum::http::StatusCode, NativeError> {
    state
        .mcp_store
        .delete(&owner, &name)
        .await
        .map(|_| axum::http::StatusCode::NO_CONTENT)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

#[derive(Debug, Deserialize)]
struct ShareRequest {
    name: String,
    ttl_secs: u64,
}

#[derive(Debug, Serialize)]
struct ShareResponse {
    token: String,
}

async fn share_mcp_server(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(req): Json<ShareRequest>,
) -> Result<Json<ShareResponse>, NativeError> {
    let entry = state
        .mcp_store
        .get(&owner, &req.name)
        .await
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)?;
    let token = state
        .mcp_store
        .share_create(&owner, entry, Duration::from_secs(req.ttl_secs))
        .await
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)?;
    Ok(Json(ShareResponse { token }))
}

async fn resolve_mcp_share(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(token): Path<String>,
) -> Result<Json<McpServerEntry>, NativeError> {
    state
        .mcp_store
        .share_resolve(&owner, &token)
        .await
        .map(Json)
        .map_err(gateway_core::GatewayError::from)
        .map_err(NativeError)
}

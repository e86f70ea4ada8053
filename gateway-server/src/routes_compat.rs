//! OpenAI-compatible `/v1/*` routes (spec §6, §4.9): a thin translation shim over the same
//! `AgentRunner`/`SdkRequest` machinery the native routes use, so compat callers get the same
//! session/MCP/permission behavior through a different wire shape.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use gateway_core::{AgentRunner, SdkRequest};
use gateway_protocol::Event;

use crate::auth::Owner;
use crate::error::{compat_error_envelope, CompatError};
use crate::openai::{
    self, assemble_prompt, build_chat_response, list_models, resolve_model_alias, ChatCompletionRequest,
};
use crate::sink::{CoalescingQueue, QueueWriter};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/chat/completions", axum::routing::post(chat_completions))
        .route("/v1/models", get(list_models_route))
        .route("/v1/models/:id", get(get_model_route))
}

/// Maps a requested compat model name through the fixed alias table. Unknown names fail with
/// `model_not_found` rather than passing through untranslated.
fn native_model(requested: &str) -> Result<String, gateway_core::GatewayError> {
    resolve_model_alias(requested)
        .map(str::to_string)
        .ok_or_else(|| gateway_core::GatewayError::model_not_found(format!("model {requested} not found")))
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, CompatError> {
    for field in openai::ignored_sampling_fields(&req) {
        tracing::warn!(field, "compat request set a sampling field the gateway does not honor");
    }

    let model = native_model(&req.model).map_err(CompatError)?;
    let prompt = assemble_prompt(&req.messages);
    let session = state
        .sessions
        .create(&owner, &model, None, None, gateway_store::SessionMode::Code)
        .await
        .map_err(gateway_core::GatewayError::from)
        .map_err(CompatError)?;

    let sdk_request = SdkRequest {
        session_id: session.id.clone(),
        prompt,
        model: model.clone(),
        max_turns: None,
        allowed_tools: Vec::new(),
        disallowed_tools: Vec::new(),
        permission_mode: openai::default_permission_mode(),
        mcp_servers: Default::default(),
        working_directory: None,
        images: Vec::new(),
        agents: Vec::new(),
    };
    let sdk_session = state.sdk.start(sdk_request).await.map_err(CompatError)?;
    let runner = AgentRunner::new(sdk_session, state.config.permission_request_timeout);

    if req.stream {
        return Ok(stream_chat_completion(state, owner, session.id, model, runner).await);
    }

    let response = runner.invoke().await.map_err(CompatError)?;
    record_turn(&state, &owner, &session.id, response.cost).await;
    let body = build_chat_response(model, response.text, response.stop_reason, response.usage);
    Ok(Json(body).into_response())
}

async fn record_turn(state: &AppState, owner: &str, session_id: &str, cost: Option<f64>) {
    let patch = gateway_store::SessionPatch {
        total_turns_delta: Some(1),
        total_cost_delta: cost,
        ..Default::default()
    };
    if let Err(err) = state.sessions.update(session_id, owner, patch).await {
        tracing::warn!(session_id, error = ?err, "failed to record turn accounting");
    }
}

/// Streams one completion as `chat.completion.chunk` SSE frames, ending with the `[DONE]`
/// sentinel OpenAI clients expect (spec §4.9 "Streaming translation").
async fn stream_chat_completion(
    state: Arc<AppState>,
    owner: String,
    session_id: String,
    model: String,
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

    let completion_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let sse_stream = async_stream::stream! {
        while let Some(sequenced) = queue.recv().await {
            if let Event::Result { cost, .. } = &sequenced.event {
                record_turn(&state, &owner, &session_id, *cost).await;
            }
            if let Event::ToolStart { tool_name, .. } = &sequenced.event {
                state.webhooks.dispatch(&session_id, tool_name).await;
            }
            // An error is surfaced through the same error envelope a non-streaming request
            // would get, not folded into a chat-completion chunk (spec §4.9 "Error translation").
            if let Event::Error { message } = &sequenced.event {
                let err = gateway_core::GatewayError::upstream(message.clone());
                match serde_json::to_string(&compat_error_envelope(&err)) {
                    Ok(body) => yield Ok::<_, std::convert::Infallible>(SseEvent::default().data(body)),
                    Err(err) => tracing::warn!(error = %err, "failed to serialize compat error frame"),
                }
                yield Ok(SseEvent::default().data("[DONE]"));
                break;
            }
            if let Some(chunk) = openai::translate_stream_event(&completion_id, &model, &sequenced.event) {
                match serde_json::to_string(&chunk) {
                    Ok(body) => yield Ok::<_, std::convert::Infallible>(SseEvent::default().data(body)),
                    Err(err) => tracing::warn!(error = %err, "failed to serialize compat chunk"),
                }
            }
            if sequenced.event.is_terminal() {
                yield Ok(SseEvent::default().data("[DONE]"));
                break;
            }
        }
    };

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text(""))
        .into_response()
}

async fn list_models_route() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": list_models(),
    }))
}

async fn get_model_route(Path(id): Path<String>) -> Result<Json<openai::ModelObject>, CompatError> {
    list_models()
        .into_iter()
        .find(|m| m.id == id)
        .ok_or_else(|| CompatError(gateway_core::GatewayError::not_found(format!("model {id} not found"))))
        .map(Json)
}

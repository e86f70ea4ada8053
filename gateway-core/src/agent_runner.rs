//! Drives one agent invocation to completion (spec §4.6). Owns exactly one [`SdkSession`] for
//! its lifetime and guarantees its release on every exit path, including cancellation, simply
//! by Rust's drop order once `run`/`invoke` return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_protocol::{Event, PermissionDecision, Sequencer, SequencedEvent, StopReason, Usage};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::sdk::SdkSession;
use crate::sink::EventSink;

/// Aggregated result of a non-streaming invocation.
#[derive(Clone, Debug)]
pub struct SingleQueryResponse {
    pub session_id: Uuid,
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub cost: Option<f64>,
}

struct PendingPermission {
    tool_use_id: String,
    answered: Arc<AtomicBool>,
}

/// Drives one SDK session. Shareable (`Arc<AgentRunner>`) so the owning connection handler can
/// call `interrupt`/`answer` concurrently with the in-flight `run`/`invoke` task.
pub struct AgentRunner {
    session: Mutex<Box<dyn SdkSession>>,
    cancel: CancellationToken,
    permission_timeout: Duration,
    pending_permission: Mutex<Option<PendingPermission>>,
}

impl AgentRunner {
    pub fn new(session: Box<dyn SdkSession>, permission_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            cancel: CancellationToken::new(),
            permission_timeout,
            pending_permission: Mutex::new(None),
        })
    }

    /// Requests the SDK stop the current turn. Cooperative: the run loop observes cancellation
    /// at its next suspension point and still drains (or declares) a terminal event.
    pub async fn interrupt(&self) {
        self.cancel.cancel();
        self.session.lock().await.interrupt().await;
    }

    /// Forwards a decision for a pending `permission_request`. A no-op if `tool_use_id` does
    /// not match the currently pending request (e.g. it already auto-denied on timeout).
    pub async fn answer(&self, tool_use_id: String, decision: PermissionDecision) {
        let mut pending = self.pending_permission.lock().await;
        if let Some(p) = pending.as_ref() {
            if p.tool_use_id == tool_use_id && !p.answered.swap(true, Ordering::SeqCst) {
                self.session.lock().await.answer(tool_use_id, decision).await;
                *pending = None;
            }
        }
    }

    fn watch_permission_timeout(self: &Arc<Self>, tool_use_id: String, answered: Arc<AtomicBool>) {
        let runner = self.clone();
        let timeout = self.permission_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !answered.swap(true, Ordering::SeqCst) {
                tracing::warn!(tool_use_id = %tool_use_id, "permission request timed out, auto-denying");
                runner.session.lock().await.answer(tool_use_id, PermissionDecision::Deny).await;
                *runner.pending_permission.lock().await = None;
            }
        });
    }

    /// Emits events to `sink` as they arrive. The sink's admission policy (block, or coalesce
    /// adjacent `*_delta` partials under backpressure) is entirely its own concern (spec §4.7).
    pub async fn run(self: Arc<Self>, sink: impl EventSink) -> Result<(), GatewayError> {
        let mut sequencer = Sequencer::new();
        loop {
            if self.cancel.is_cancelled() {
                let _ = sink
                    .send(sequencer.tag(Event::Result {
                        stop_reason: StopReason::Interrupted,
                        usage: Usage::default(),
                        cost: None,
                    }))
                    .await;
                return Ok(());
            }

            let event = {
                let mut session = self.session.lock().await;
                session.next_event().await
            };

            let Some(event) = event else {
                return Ok(());
            };

            if let Event::PermissionRequest { tool_use_id, .. } = &event {
                let answered = Arc::new(AtomicBool::new(false));
                *self.pending_permission.lock().await = Some(PendingPermission {
                    tool_use_id: tool_use_id.clone(),
                    answered: answered.clone(),
                });
                self.watch_permission_timeout(tool_use_id.clone(), answered);
            }

            let terminal = event.is_terminal();
            if !sink.send(sequencer.tag(event)).await {
                // Receiver dropped (slow-client cancellation already tore down the writer).
                self.cancel.cancel();
                return Ok(());
            }
            if terminal {
                return Ok(());
            }
        }
    }

    /// Consumes the event stream internally, aggregating text blocks into one response,
    /// without ever exposing a caller-visible channel.
    pub async fn invoke(self: Arc<Self>) -> Result<SingleQueryResponse, GatewayError> {
        let (tx, mut rx) = mpsc::channel(32);
        let runner = self.clone();
        let handle = tokio::spawn(async move { runner.run(tx).await });

        let mut session_id = Uuid::nil();
        let mut text = String::new();
        let mut stop_reason = StopReason::Error;
        let mut usage = Usage::default();
        let mut cost = None;

        while let Some(SequencedEvent { event, .. }) = rx.recv().await {
            match event {
                Event::Init { session_id: id } => session_id = id,
                Event::Partial {
                    block: gateway_protocol::PartialBlock::TextDelta { text: delta },
                    ..
                } => text.push_str(&delta),
                Event::Result {
                    stop_reason: reason,
                    usage: u,
                    cost: c,
                } => {
                    stop_reason = reason;
                    usage = u;
                    cost = c;
                }
                Event::Error { message } => {
                    return Err(GatewayError::upstream(message));
                }
                _ => {}
            }
        }

        handle.await.map_err(|e| GatewayError::internal(e.to_string()))??;

        Ok(SingleQueryResponse {
            session_id,
            text,
            stop_reason,
            usage,
            cost,
        })
    }
}

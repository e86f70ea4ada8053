//! A trivial [`AgentSdk`] that echoes the prompt back as text deltas. The real model-inference
//! SDK is out of scope (spec §1 Non-goals); this stands in so the gateway runs end-to-end
//! without one wired in, and gives integration tests something concrete to drive.

use async_trait::async_trait;
use gateway_protocol::{Event, PermissionDecision, StopReason, Usage};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::sdk::{AgentSdk, SdkRequest, SdkSession};

pub struct EchoSdk;

struct EchoSession {
    session_id: Uuid,
    words: std::vec::IntoIter<String>,
    done: bool,
}

#[async_trait]
impl SdkSession for EchoSession {
    async fn next_event(&mut self) -> Option<Event> {
        if self.session_id != Uuid::nil() {
            let id = self.session_id;
            self.session_id = Uuid::nil();
            return Some(Event::Init { session_id: id });
        }
        if let Some(word) = self.words.next() {
            return Some(Event::Partial {
                index: 0,
                block: gateway_protocol::PartialBlock::TextDelta {
                    text: format!("{word} "),
                },
            });
        }
        if !self.done {
            self.done = true;
            return Some(Event::Result {
                stop_reason: StopReason::Completed,
                usage: Usage {
                    input_tokens: 0,
                    output_tokens: 0,
                },
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
impl AgentSdk for EchoSdk {
    async fn start(&self, request: SdkRequest) -> Result<Box<dyn SdkSession>, GatewayError> {
        let words: Vec<String> = request.prompt.split_whitespace().map(str::to_string).collect();
        Ok(Box::new(EchoSession {
            session_id: Uuid::new_v4(),
            words: words.into_iter(),
            done: false,
        }))
    }
}

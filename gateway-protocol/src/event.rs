//! Wire-level event union emitted by an agent run (spec §3 "Event").
//!
//! Every event carries `{type, ...payload}` via `#[serde(tag = "type")]`; sequencing
//! (`event_id`) is applied separately by [`crate::sequence::Sequencer`] so this type stays
//! a pure payload, not a framing concern.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One block of incremental content within a `partial` event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum PartialBlock {
    TextDelta { text: String },
    ThinkingDelta { text: String },
    InputJsonDelta { partial_json: String },
    BlockStart { content_type: String },
    BlockStop,
}

impl PartialBlock {
    /// True for the delta kinds the multiplexer is allowed to coalesce (spec §4.7).
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            PartialBlock::TextDelta { .. }
                | PartialBlock::ThinkingDelta { .. }
                | PartialBlock::InputJsonDelta { .. }
        )
    }

    /// Concatenates a same-kind delta onto this block in place. Returns false (no-op) if
    /// the kinds differ — caller must not coalesce across kinds.
    pub fn coalesce(&mut self, next: &PartialBlock) -> bool {
        match (self, next) {
            (PartialBlock::TextDelta { text }, PartialBlock::TextDelta { text: more }) => {
                text.push_str(more);
                true
            }
            (PartialBlock::ThinkingDelta { text }, PartialBlock::ThinkingDelta { text: more }) => {
                text.push_str(more);
                true
            }
            (
                PartialBlock::InputJsonDelta { partial_json },
                PartialBlock::InputJsonDelta { partial_json: more },
            ) => {
                partial_json.push_str(more);
                true
            }
            _ => false,
        }
    }
}

/// Status of a completed tool invocation (spec §3 `tool_result.status`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// Terminal reason a run stopped (spec §3 `result.stop_reason`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    MaxTurnsReached,
    Interrupted,
    Error,
}

/// Token/cost accounting attached to a terminal `result` event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Decision for a pending permission request (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    Deny,
    AlwaysAllow,
    AlwaysDeny,
}

/// Wire-level tagged union emitted by an `AgentRunner` (spec §3 "Event").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Init {
        session_id: Uuid,
    },
    Partial {
        index: u32,
        block: PartialBlock,
    },
    Message {
        content: Value,
    },
    ToolStart {
        tool_use_id: String,
        tool_name: String,
        input: Value,
    },
    ToolEnd {
        tool_use_id: String,
    },
    ToolResult {
        tool_use_id: String,
        status: ToolResultStatus,
        output: Value,
    },
    PermissionRequest {
        tool_use_id: String,
        tool_name: String,
        input: Value,
    },
    Result {
        stop_reason: StopReason,
        usage: Usage,
        #[serde(skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
    },
    Error {
        message: String,
    },
}

impl Event {
    /// True for events the multiplexer must never drop or coalesce (spec §4.7).
    pub fn is_non_coalescable(&self) -> bool {
        !matches!(self, Event::Partial { block, .. } if block.is_delta())
    }

    /// Serializes the event to a JSON object (no envelope/sequencing fields).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// True once this event terminates the stream (spec §3: `result`, `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Result { .. } | Event::Error { .. })
    }
}

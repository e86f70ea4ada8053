//! OpenAI-compatible translation layer (spec §4.9): request/response/stream shapes for
//! `/v1/chat/completions` and `/v1/models`, all expressed in terms of the native `Event`
//! stream so the rest of the gateway never has to know a second wire format exists.

use gateway_core::PermissionMode;
use gateway_protocol::{Event, PartialBlock, StopReason, Usage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Known compat model aliases mapped to the native model identifier.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt-4", "claude-default"),
    ("gpt-4-turbo", "claude-default"),
    ("gpt-3.5-turbo", "claude-fast"),
];

pub fn resolve_model_alias(requested: &str) -> Option<&'static str> {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == requested)
        .map(|(_, native)| *native)
}

pub fn list_model_ids() -> Vec<&'static str> {
    MODEL_ALIASES.iter().map(|(alias, _)| *alias).collect()
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub n: Option<u32>,
}

/// Ignored sampling parameters that still got a value, so the caller can be warned rather
/// than silently misled about what the gateway honored.
pub fn ignored_sampling_fields(request: &ChatCompletionRequest) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if request.temperature.is_some() {
        ignored.push("temperature");
    }
    if request.top_p.is_some() {
        ignored.push("top_p");
    }
    if request.n.is_some() && request.n != Some(1) {
        ignored.push("n");
    }
    ignored
}

/// Collapses a chat message list into the single prompt string a `SdkRequest` expects.
/// System messages are concatenated first, then the remaining turns are role-prefixed with
/// their role upper-cased and separated by a blank line (spec §4.9 "Prompt assembly").
pub fn assemble_prompt(messages: &[ChatMessage]) -> String {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        if message.role == "system" {
            system_parts.push(message.content.as_str());
        } else {
            turns.push(format!("{}: {}", message.role.to_uppercase(), message.content));
        }
    }
    let mut sections = Vec::new();
    if !system_parts.is_empty() {
        sections.push(system_parts.join("\n\n"));
    }
    sections.push(turns.join("\n\n"));
    sections.join("\n\n")
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessageOut,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatMessageOut {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

pub fn finish_reason(stop_reason: StopReason) -> &'static str {
    match stop_reason {
        StopReason::Completed => "stop",
        StopReason::MaxTurnsReached => "length",
        StopReason::Interrupted => "stop",
        StopReason::Error => "stop",
    }
}

pub fn build_chat_response(
    model: String,
    text: String,
    stop_reason: StopReason,
    usage: Usage,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion",
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessageOut {
                role: "assistant",
                content: text,
            },
            finish_reason: finish_reason(stop_reason),
        }],
        usage: ChatUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Translates one native event into zero or one streaming chunk. Thinking, tool, and
/// message events carry no OpenAI-compatible shape and are dropped from the compat stream
/// (spec §4.9 "Streaming translation"); only text deltas and the terminal event surface.
pub fn translate_stream_event(
    completion_id: &str,
    model: &str,
    event: &Event,
) -> Option<ChatCompletionChunk> {
    let (delta, finish) = match event {
        Event::Init { .. } => (
            ChatDelta {
                role: Some("assistant"),
                content: None,
            },
            None,
        ),
        Event::Partial {
            block: PartialBlock::TextDelta { text },
            ..
        } => (
            ChatDelta {
                role: None,
                content: Some(text.clone()),
            },
            None,
        ),
        Event::Result { stop_reason, .. } => (ChatDelta::default(), Some(finish_reason(*stop_reason))),
        Event::Error { .. } => (ChatDelta::default(), Some("stop")),
        _ => return None,
    };
    Some(ChatCompletionChunk {
        id: completion_id.to_string(),
        object: "chat.completion.chunk",
        model: model.to_string(),
        choices: vec![ChatChunkChoice {
            index: 0,
            delta,
            finish_reason: finish,
        }],
    })
}

#[derive(Debug, Serialize)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub owned_by: &'static str,
}

pub fn list_models() -> Vec<ModelObject> {
    list_model_ids()
        .into_iter()
        .map(|id| ModelObject {
            id: id.to_string(),
            object: "model",
            owned_by: "gateway",
        })
        .collect()
}

/// OpenAI's `tool_choice`/permission model has no direct analogue; compat requests always
/// run with the default permission posture.
pub fn default_permission_mode() -> PermissionMode {
    PermissionMode::Default
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn resolves_known_aliases() {
        assert_eq!(resolve_model_alias("gpt-4"), Some("claude-default"));
        assert_eq!(resolve_model_alias("gpt-3.5-turbo"), Some("claude-fast"));
        assert_eq!(resolve_model_alias("unknown-model"), None);
    }

    #[test]
    fn assembles_system_then_turns() {
        let messages = vec![
            ChatMessage {
                role: "system".into(),
                content: "be terse".into(),
            },
            ChatMessage {
                role: "user".into(),
                content: "hello".into(),
            },
        ];
        let prompt = assemble_prompt(&messages);
        assert!(prompt.starts_with("be terse"));
        assert!(prompt.contains("USER: hello"));
        assert!(prompt.contains("\n\n"));
    }

    #[test]
    fn assemble_prompt_separates_turns_with_blank_line() {
        let messages = vec![
            ChatMessage {
                role: "user".into(),
                content: "first".into(),
            },
            ChatMessage {
                role: "assistant".into(),
                content: "second".into(),
            },
        ];
        let prompt = assemble_prompt(&messages);
        assert_eq!(prompt, "USER: first\n\nASSISTANT: second");
    }

    #[test]
    fn flags_ignored_sampling_fields() {
        let request = ChatCompletionRequest {
            model: "gpt-4".into(),
            messages: vec![],
            stream: false,
            temperature: Some(0.9),
            top_p: None,
            n: Some(2),
        };
        let ignored = ignored_sampling_fields(&request);
        assert!(ignored.contains(&"temperature"));
        assert!(ignored.contains(&"n"));
        assert!(!ignored.contains(&"top_p"));
    }

    #[test]
    fn stream_translation_drops_non_text_events() {
        let tool_start = Event::ToolStart {
            tool_use_id: "t1".into(),
            tool_name: "bash".into(),
            input: Value::Null,
        };
        assert!(translate_stream_event("id", "gpt-4", &tool_start).is_none());

        let delta = Event::Partial {
            index: 0,
            block: PartialBlock::TextDelta { text: "hi".into() },
        };
        let chunk = translate_stream_event("id", "gpt-4", &delta).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn finish_reason_maps_stop_reasons() {
        assert_eq!(finish_reason(StopReason::Completed), "stop");
        assert_eq!(finish_reason(StopReason::MaxTurnsReached), "length");
        assert_eq!(finish_reason(StopReason::Error), "stop");
    }

    #[test]
    fn stream_translation_maps_error_events_to_stop() {
        let error = Event::Error { message: "boom".into() };
        let chunk = translate_stream_event("id", "gpt-4", &error).unwrap();
        assert_eq!(chunk.choices[0].finish_reason, Some("stop"));
    }
}

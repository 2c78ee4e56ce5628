use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::base::{Reply, Usage};
use super::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{ToolCall, ToolSpec};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Convert the rendered conversation to OpenAI's chat message specification.
///
/// Tool results are sent as `role: tool` entries correlated with the
/// assistant message that announced the call. A tool result with no matching
/// announcement cannot be expressed that way and is sent as user text.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(messages.len());
    let mut pending_calls: HashSet<String> = HashSet::new();

    for message in messages {
        match message.role {
            Role::Assistant => {
                let mut converted = json!({ "role": "assistant", "content": message.content });
                if let Some(call) = &message.tool_call {
                    let id = Message::correlation_id(&call.name);
                    converted["tool_calls"] = json!([{
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(&call.name),
                            "arguments": call.arguments.to_string(),
                        }
                    }]);
                    pending_calls.insert(id);
                }
                spec.push(converted);
            }
            Role::Tool => {
                let name = message.tool_name.as_deref().unwrap_or_default();
                let id = Message::correlation_id(name);
                if pending_calls.remove(&id) {
                    spec.push(json!({
                        "role": "tool",
                        "tool_call_id": id,
                        "content": message.content,
                    }));
                } else {
                    spec.push(json!({
                        "role": "user",
                        "content": format!("Result from tool '{}':\n{}", name, message.content),
                    }));
                }
            }
            Role::System | Role::User => {
                spec.push(json!({ "role": message.role, "content": message.content }));
            }
        }
    }

    spec
}

/// Convert tool specs to OpenAI's function declarations
pub fn tools_to_openai_spec(tools: &[ToolSpec]) -> ProviderResult<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(tools.len());

    for tool in tools {
        if !seen.insert(tool.name.as_str()) {
            return Err(ProviderError::InvalidRequest(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters_schema(),
            }
        }));
    }

    Ok(result)
}

/// Decode tool-call arguments that arrive as a JSON-encoded string.
///
/// Undecodable strings are kept as a plain string value so the target tool
/// can report what it received.
pub fn parse_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        Value::Null => json!({}),
        other => other.clone(),
    }
}

/// Normalize an OpenAI chat completion into a [`Reply`]
pub fn openai_response_to_reply(response: &Value) -> ProviderResult<Reply> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| {
            ProviderError::Unknown(format!("Invalid response format from OpenAI API: {}", response))
        })?;

    let text = message
        .get("content")
        .and_then(|content| content.as_str())
        .map(str::to_string);

    let tool_calls = message
        .get("tool_calls")
        .and_then(|calls| calls.as_array())
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?;
                    let arguments = function.get("arguments").unwrap_or(&Value::Null);
                    Some(ToolCall::new(name, parse_arguments(arguments)))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Reply { text, tool_calls })
}

/// Token usage from an OpenAI-style `usage` object
pub fn openai_usage(response: &Value) -> Usage {
    let usage = &response["usage"];
    Usage::new(
        read_tokens(usage, "prompt_tokens"),
        read_tokens(usage, "completion_tokens"),
    )
}

pub(crate) fn read_tokens(usage: &Value, key: &str) -> Option<u32> {
    usage
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

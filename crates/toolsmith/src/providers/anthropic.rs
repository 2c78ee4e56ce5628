use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use super::base::{Provider, Reply, Usage};
use super::configs::AnthropicProviderConfig;
use super::errors::{classify_status, ProviderError, ProviderResult};
use super::utils::{parse_arguments, read_tokens, sanitize_function_name};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{ToolCall, ToolSpec};

pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Status Anthropic uses when the API is overloaded
const OVERLOADED: u16 = 529;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        Usage::new(
            read_tokens(usage, "input_tokens"),
            read_tokens(usage, "output_tokens"),
        )
    }

    async fn post(&self, payload: Value) -> ProviderResult<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                if status.as_u16() == OVERLOADED {
                    return Err(ProviderError::RateLimited(format!("{} - {}", status, body)));
                }
                Err(classify_status(status, &body))
            }
        }
    }
}

/// Split the conversation into the `system` side channel and the turn list.
///
/// Anthropic requires alternating roles, so consecutive turns with the same
/// role are merged into one turn with several content blocks.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();
    let mut pending_calls: HashSet<String> = HashSet::new();

    for message in messages {
        let (role, blocks) = match message.role {
            Role::System => {
                system_parts.push(message.content.as_str());
                continue;
            }
            Role::User => ("user", vec![text_block(&message.content)]),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(text_block(&message.content));
                }
                if let Some(call) = &message.tool_call {
                    let id = Message::correlation_id(&call.name);
                    blocks.push(tool_use_block(&id, call));
                    pending_calls.insert(id);
                }
                ("assistant", blocks)
            }
            Role::Tool => {
                let name = message.tool_name.as_deref().unwrap_or_default();
                let id = Message::correlation_id(name);
                let block = if pending_calls.remove(&id) {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": message.content,
                    })
                } else {
                    text_block(&format!("Result from tool '{}':\n{}", name, message.content))
                };
                ("user", vec![block])
            }
        };

        // the API rejects empty text blocks
        let blocks: Vec<Value> = blocks
            .into_iter()
            .filter(|b| b["type"] != "text" || b["text"].as_str().is_some_and(|t| !t.is_empty()))
            .collect();
        if blocks.is_empty() {
            continue;
        }

        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    let turns = turns
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect();

    (system, turns)
}

fn text_block(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

fn tool_use_block(id: &str, call: &ToolCall) -> Value {
    let input = match &call.arguments {
        Value::Object(_) => call.arguments.clone(),
        _ => json!({}),
    };
    json!({
        "type": "tool_use",
        "id": id,
        "name": sanitize_function_name(&call.name),
        "input": input,
    })
}

pub fn tools_to_anthropic_spec(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters_schema(),
            })
        })
        .collect()
}

/// Normalize a Messages API response into a [`Reply`]
pub fn anthropic_response_to_reply(response: &Value) -> ProviderResult<Reply> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| {
            ProviderError::Unknown(format!(
                "Invalid response format from Anthropic API: {}",
                response
            ))
        })?;

    let text = blocks
        .iter()
        .find(|block| block["type"] == "text")
        .and_then(|block| block["text"].as_str())
        .map(str::to_string);

    let tool_calls = blocks
        .iter()
        .filter(|block| block["type"] == "tool_use")
        .filter_map(|block| {
            let name = block.get("name")?.as_str()?;
            let input = block.get("input").unwrap_or(&Value::Null);
            Some(ToolCall::new(name, parse_arguments(input)))
        })
        .collect();

    Ok(Reply { text, tool_calls })
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> ProviderResult<(Reply, Usage)> {
        let (system, turns) = messages_to_anthropic_spec(messages);

        let mut payload = json!({
            "model": self.config.model,
            "messages": turns,
            "max_tokens": self.config.max_tokens,
        });

        if let Some(system) = system {
            payload["system"] = json!(system);
        }
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_anthropic_spec(tools));
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        tracing::debug!(model = %self.config.model, messages = messages.len(), "sending messages request");
        let response = self.post(payload).await?;

        let reply = anthropic_response_to_reply(&response)?;
        Ok((reply, Self::get_usage(&response)))
    }
}

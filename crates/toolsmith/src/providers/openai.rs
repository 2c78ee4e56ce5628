use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Reply, Usage};
use super::configs::OpenAiProviderConfig;
use super::errors::{classify_status, ProviderError, ProviderResult};
use super::utils::{
    messages_to_openai_spec, openai_response_to_reply, openai_usage, tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> ProviderResult<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status(status, &body))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> ProviderResult<(Reply, Usage)> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(messages),
        });

        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(tools)?);
            payload["tool_choice"] = json!("auto");
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        tracing::debug!(model = %self.config.model, messages = messages.len(), "sending chat completion");
        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(ProviderError::Unknown(format!("OpenAI API error: {}", error)));
        }

        let reply = openai_response_to_reply(&response)?;
        Ok((reply, openai_usage(&response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: server.uri(),
            model: "gpt-3.5-turbo".to_string(),
            ..OpenAiProviderConfig::new("test_api_key")
        }
    }

    async fn setup_mock_server(status: u16, response_body: Value) -> (MockServer, OpenAiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(ResponseTemplate::new(status).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config_for(&mock_server)).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });

        let (_, provider) = setup_mock_server(200, response_body).await;
        let messages = vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello?"),
        ];

        let (reply, usage) = provider.complete(&messages, &[]).await?;

        assert_eq!(reply.text.as_deref(), Some("Hello! How can I assist you today?"));
        assert!(reply.tool_calls.is_empty());
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "get_weather",
                            "arguments": "{\"location\":\"San Francisco, CA\"}"
                        }
                    }, {
                        "id": "call_456",
                        "type": "function",
                        "function": { "name": "final_answer", "arguments": "{\"answer\":\"sunny\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 15,
                "total_tokens": 35
            }
        });

        let (_, provider) = setup_mock_server(200, response_body).await;
        let messages = vec![Message::user("What's the weather in San Francisco?")];
        let tool = ToolSpec::new("get_weather", "Gets the current weather for a location")
            .with_parameter("location", "string", "The city and state, e.g. New York, NY");

        let (reply, usage) = provider.complete(&messages, &[tool]).await?;

        assert_eq!(reply.text, None);
        assert_eq!(
            reply.tool_calls,
            vec![
                ToolCall::new("get_weather", json!({"location": "San Francisco, CA"})),
                ToolCall::new("final_answer", json!({"answer": "sunny"})),
            ]
        );
        assert_eq!(usage.input_tokens, Some(20));
        Ok(())
    }

    #[tokio::test]
    async fn test_request_declares_tools() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "tool_choice": "auto",
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "calculator",
                        "parameters": { "required": ["expression"] }
                    }
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "ok" } }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config_for(&mock_server))?;
        let tool = ToolSpec::new("calculator", "Evaluates arithmetic").with_parameter(
            "expression",
            "string",
            "The expression",
        );

        let (reply, usage) = provider.complete(&[Message::user("2+2")], &[tool]).await?;
        assert_eq!(reply.text.as_deref(), Some("ok"));
        assert_eq!(usage, Usage::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_is_classified() {
        let body = json!({"error": {"message": "Too many requests", "type": "requests", "code": "rate_limit_exceeded"}});
        let (_, provider) = setup_mock_server(429, body).await;

        let err = provider.complete(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_bad_request_is_classified() {
        let body = json!({"error": {"message": "Unknown parameter", "type": "invalid_request_error"}});
        let (_, provider) = setup_mock_server(400, body).await;

        let err = provider.complete(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.to_string().contains("Unknown parameter"));
    }

    #[tokio::test]
    async fn test_server_error_is_unknown() {
        let (_, provider) = setup_mock_server(500, json!({"error": "internal"})).await;

        let err = provider.complete(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unknown(_)));
    }
}

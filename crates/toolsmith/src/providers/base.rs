use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::ProviderResult;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolSpec};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl Usage {
    pub fn new(input_tokens: Option<u32>, output_tokens: Option<u32>) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// The canonical reply every backend is normalized into
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: Option<String>,
    /// Tool calls in the order the backend emitted them
    pub tool_calls: Vec<ToolCall>,
}

impl Reply {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Reply {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Reply {
            text: None,
            tool_calls: vec![call],
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// Base trait for language model backends (OpenAI, Anthropic, etc)
///
/// Implementations make exactly one request per call and classify failures
/// into [`ProviderError`](super::errors::ProviderError); retrying is left to
/// the [`ProviderGateway`](super::gateway::ProviderGateway).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send the conversation and the tools the model may call
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> ProviderResult<(Reply, Usage)>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20));
        let serialized = serde_json::to_string(&usage)?;
        let deserialized: Usage = serde_json::from_str(&serialized)?;
        assert_eq!(usage, deserialized);

        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["output_tokens"], json!(20));
        Ok(())
    }

    #[test]
    fn test_reply_builders() {
        let reply = Reply::tool_call(ToolCall::new("a", json!({})))
            .with_tool_call(ToolCall::new("b", json!({})));
        assert_eq!(reply.text_or_empty(), "");
        let names: Vec<_> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::role::Role;
use super::tool::ToolCall;
use crate::providers::utils::sanitize_function_name;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message in the model-visible conversation
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on tool results: the tool that produced the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Set on the assistant message that announces the tool it chose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    pub created: i64,
}

impl Message {
    fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Message {
            role,
            content: content.into(),
            tool_name: None,
            tool_call: None,
            created: Utc::now().timestamp(),
        }
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The result of running `tool_name`
    pub fn tool<N: Into<String>, S: Into<String>>(tool_name: N, content: S) -> Self {
        let mut message = Self::new(Role::Tool, content);
        message.tool_name = Some(tool_name.into());
        message
    }

    /// Attach the tool call this (assistant) message announces
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_call = Some(tool_call);
        self
    }

    /// Id used to pair a tool call with its result on the wire
    pub fn correlation_id(tool_name: &str) -> String {
        format!("call_{}", sanitize_function_name(tool_name))
    }
}

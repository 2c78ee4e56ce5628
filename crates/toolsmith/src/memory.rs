//! Conversation memory for a single run.
//!
//! Two append-only logs: the messages the model sees, and the execution
//! history (tool calls and the final answer) used for diagnostics and the
//! step-budget summary. Nothing is ever rewritten, removed or windowed here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::message::Message;
use crate::models::tool::ToolCall;

/// An entry in the execution history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    ToolCall {
        tool_name: String,
        arguments: Value,
        result: String,
        timestamp: DateTime<Utc>,
    },
    FinalAnswer {
        answer: String,
        timestamp: DateTime<Utc>,
    },
}

impl Step {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Step::ToolCall { timestamp, .. } | Step::FinalAnswer { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Memory {
    messages: Vec<Message>,
    history: Vec<Step>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, message: Message) -> Message {
        self.messages.push(message.clone());
        message
    }

    pub fn append_system<S: Into<String>>(&mut self, content: S) -> Message {
        self.push(Message::system(content))
    }

    pub fn append_user<S: Into<String>>(&mut self, content: S) -> Message {
        self.push(Message::user(content))
    }

    pub fn append_assistant<S: Into<String>>(&mut self, content: S) -> Message {
        self.push(Message::assistant(content))
    }

    /// Assistant message announcing the tool the model chose
    pub fn append_tool_call_notice(&mut self, call: &ToolCall) -> Message {
        self.push(
            Message::assistant(format!("I'll use the {} tool.", call.name))
                .with_tool_call(call.clone()),
        )
    }

    pub fn append_tool_result<N: Into<String>, S: Into<String>>(
        &mut self,
        tool_name: N,
        content: S,
    ) -> Message {
        self.push(Message::tool(tool_name, content))
    }

    pub fn record_tool_call<N: Into<String>, S: Into<String>>(
        &mut self,
        tool_name: N,
        arguments: Value,
        result: S,
    ) -> Step {
        let step = Step::ToolCall {
            tool_name: tool_name.into(),
            arguments,
            result: result.into(),
            timestamp: Utc::now(),
        };
        self.history.push(step.clone());
        step
    }

    pub fn record_final_answer<S: Into<String>>(&mut self, answer: S) -> Step {
        let step = Step::FinalAnswer {
            answer: answer.into(),
            timestamp: Utc::now(),
        };
        self.history.push(step.clone());
        step
    }

    /// The conversation to send to the backend, in append order
    pub fn render(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn history(&self) -> &[Step] {
        &self.history
    }

    /// `(tool name, result)` for every tool call step, oldest first
    pub fn tool_call_steps(&self) -> Vec<(&str, &str)> {
        self.history
            .iter()
            .filter_map(|step| match step {
                Step::ToolCall {
                    tool_name, result, ..
                } => Some((tool_name.as_str(), result.as_str())),
                Step::FinalAnswer { .. } => None,
            })
            .collect()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.history.iter().find_map(|step| match step {
            Step::FinalAnswer { answer, .. } => Some(answer.as_str()),
            Step::ToolCall { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use serde_json::json;

    #[test]
    fn test_render_preserves_append_order() {
        let mut memory = Memory::new();
        memory.append_system("be helpful");
        memory.append_user("what is 2 + 2?");
        memory.append_tool_call_notice(&ToolCall::new("calculator", json!({"expression": "2 + 2"})));
        memory.append_tool_result("calculator", "4");
        memory.append_assistant("done");

        let roles: Vec<Role> = memory.render().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(memory.render()[2].content, "I'll use the calculator tool.");
        assert_eq!(memory.render()[3].tool_name.as_deref(), Some("calculator"));
    }

    #[test]
    fn test_append_returns_created_message() {
        let mut memory = Memory::new();
        let message = memory.append_user("hello");
        assert_eq!(message, memory.messages()[0]);
    }

    #[test]
    fn test_history_is_separate_from_messages() {
        let mut memory = Memory::new();
        memory.record_tool_call("calculator", json!({"expression": "1 + 1"}), "2");
        memory.record_final_answer("2");

        assert!(memory.messages().is_empty());
        assert_eq!(memory.history().len(), 2);
        assert_eq!(memory.tool_call_steps(), vec![("calculator", "2")]);
        assert_eq!(memory.final_answer(), Some("2"));
    }

    #[test]
    fn test_steps_are_timestamped_in_order() {
        let mut memory = Memory::new();
        let first = memory.record_tool_call("a", json!({}), "x");
        let second = memory.record_final_answer("y");
        assert!(first.timestamp() <= second.timestamp());
    }
}

use async_trait::async_trait;
use serde_json::Value;

use super::base::{text_argument, Tool};
use crate::errors::AgentResult;
use crate::models::tool::ToolSpec;

pub const FINAL_ANSWER_TOOL_NAME: &str = "final_answer";
pub const ANSWER_TOOL_NAME: &str = "answer";

/// Names generated tools may never take
pub const RESERVED_TOOL_NAMES: [&str; 2] = [FINAL_ANSWER_TOOL_NAME, ANSWER_TOOL_NAME];

/// The terminal tool every agent carries
#[derive(Debug, Default, Clone)]
pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            FINAL_ANSWER_TOOL_NAME,
            "Provide the final answer to the task. Use this when you have completed the task.",
        )
        .with_parameter("answer", "string", "The final answer")
    }

    async fn call(&self, arguments: Value) -> AgentResult<String> {
        Ok(self.final_answer(&arguments).unwrap_or_default())
    }

    fn final_answer(&self, arguments: &Value) -> Option<String> {
        Some(text_argument(arguments, "answer").unwrap_or_default())
    }
}

/// Alternate terminal tool: a result plus an optional explanation
#[derive(Debug, Default, Clone)]
pub struct AnswerTool;

#[async_trait]
impl Tool for AnswerTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(ANSWER_TOOL_NAME, "Provide the final answer with an explanation")
            .with_parameter("result", "string", "The final result")
            .with_optional_parameter("explanation", "string", "How the result was reached")
    }

    async fn call(&self, arguments: Value) -> AgentResult<String> {
        Ok(self.final_answer(&arguments).unwrap_or_default())
    }

    fn final_answer(&self, arguments: &Value) -> Option<String> {
        let result = text_argument(arguments, "result").unwrap_or_default();
        match text_argument(arguments, "explanation") {
            Some(explanation) if !explanation.is_empty() => {
                Some(format!("{} ({})", result, explanation))
            }
            _ => Some(result),
        }
    }
}

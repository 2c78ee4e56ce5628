use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::ToolSpec;

/// Core trait for a capability the agent can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Describe the tool to the model. Must be deterministic.
    fn spec(&self) -> ToolSpec;

    /// Run the tool
    async fn call(&self, arguments: Value) -> AgentResult<String>;

    /// Run the tool, turning any failure into text the model can read
    async fn invoke(&self, arguments: Value) -> String {
        match self.call(arguments).await {
            Ok(result) => result,
            Err(err) => format!("Error executing tool: {}", err),
        }
    }

    /// Terminal tools return the answer their arguments carry; invoking one
    /// ends the run instead of going through normal dispatch.
    fn final_answer(&self, _arguments: &Value) -> Option<String> {
        None
    }
}

/// Check that every required parameter of `spec` is present in `arguments`
pub fn validate_arguments(spec: &ToolSpec, arguments: &Value) -> AgentResult<()> {
    let object = match arguments {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            return Err(AgentError::InvalidParameters(format!(
                "expected an object of arguments, got {}",
                other
            )))
        }
    };

    let missing: Vec<&str> = spec
        .required_parameters()
        .into_iter()
        .filter(|name| object.map_or(true, |map| !map.contains_key(*name)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AgentError::InvalidParameters(format!(
            "missing required parameter(s) for {}: {}",
            spec.name,
            missing.join(", ")
        )))
    }
}

/// Read an argument as text; non-string values are rendered as JSON
pub fn text_argument(arguments: &Value, name: &str) -> Option<String> {
    match arguments.get(name)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

type Handler = Box<dyn Fn(Value) -> AgentResult<String> + Send + Sync>;

/// A tool backed by a plain closure
pub struct FnTool {
    spec: ToolSpec,
    handler: Handler,
}

impl FnTool {
    pub fn new<F>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Value) -> AgentResult<String> + Send + Sync + 'static,
    {
        Self {
            spec,
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, arguments: Value) -> AgentResult<String> {
        validate_arguments(&self.spec, &arguments)?;
        (self.handler)(arguments)
    }
}

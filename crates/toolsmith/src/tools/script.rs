use async_trait::async_trait;
use rhai::Dynamic;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::base::{text_argument, Tool};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::ToolSpec;
use crate::synthesizer::sandbox::{build_engine, SandboxPolicy};
use crate::synthesizer::scripted::render;
use crate::synthesizer::Synthesizer;

pub const SCRIPT_EXECUTOR_TOOL_NAME: &str = "script_executor";
pub const CREATE_TOOL_TOOL_NAME: &str = "create_tool";

/// Evaluates a Rhai snippet under the sandbox policy
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutorTool {
    policy: SandboxPolicy,
}

impl ScriptExecutorTool {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }
}

/// Evaluate `code`, collecting anything it prints
fn evaluate(policy: &SandboxPolicy, code: &str) -> String {
    let output = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut engine = build_engine(policy);
    let sink = Arc::clone(&output);
    engine.on_print(move |text| {
        if let Ok(mut lines) = sink.lock() {
            lines.push(text.to_string());
        }
    });

    let result = engine.eval::<Dynamic>(code);
    let printed = output.lock().map(|lines| lines.join("\n")).unwrap_or_default();

    match result {
        Ok(value) if printed.trim().is_empty() => format!("Result: {}", render(value)),
        Ok(value) => format!("Output:\n{}\n\nResult: {}", printed.trim(), render(value)),
        Err(err) => format!("Error: {}", err),
    }
}

#[async_trait]
impl Tool for ScriptExecutorTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            SCRIPT_EXECUTOR_TOOL_NAME,
            "Executes Rhai script code in a sandbox. Use this to run small computations.",
        )
        .with_parameter("code", "string", "The Rhai code to execute")
    }

    async fn call(&self, arguments: Value) -> AgentResult<String> {
        let code = text_argument(&arguments, "code").unwrap_or_default();
        if code.trim().is_empty() {
            return Ok("Error: No code provided".to_string());
        }

        let policy = self.policy.clone();
        tokio::task::spawn_blocking(move || evaluate(&policy, &code))
            .await
            .map_err(|e| AgentError::Internal(format!("script did not complete: {}", e)))
    }
}

/// Validates generated tool source so the agent can install it.
///
/// The report embeds the validated declaration in a fenced block; the
/// orchestrator picks it up from there and registers the tool.
#[derive(Debug, Clone)]
pub struct CreateToolTool {
    name: String,
    synthesizer: Synthesizer,
}

impl Default for CreateToolTool {
    fn default() -> Self {
        Self::new(SandboxPolicy::default())
    }
}

impl CreateToolTool {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self {
            name: CREATE_TOOL_TOOL_NAME.to_string(),
            synthesizer: Synthesizer::new(policy),
        }
    }

    /// Register under another name, e.g. `custom_executor`
    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Tool for CreateToolTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name.clone(),
            "Creates a new tool that can be used in later steps. The code must be a \
             declaration `impl Tool for Name { ... }` whose body is Rhai script defining \
             `fn run(args)` and optionally `fn name()`, `fn description()` and \
             `fn parameters()` (a map of parameter name to type or to \
             #{type, description, required}).",
        )
        .with_parameter("code", "string", "The tool declaration")
        .with_optional_parameter("args", "object", "Arguments for a trial run of the new tool")
    }

    async fn call(&self, arguments: Value) -> AgentResult<String> {
        let code = text_argument(&arguments, "code").unwrap_or_default();
        if code.trim().is_empty() {
            return Ok("Error: No code provided".to_string());
        }

        let tool = match self.synthesizer.build(&code) {
            Ok(tool) => tool,
            Err(err) => return Ok(format!("Error: {}", err)),
        };
        let spec = tool.spec();

        let mut report = format!("Validated tool '{}': {}", spec.name, spec.description);
        if !spec.parameters.is_empty() {
            let parameters: Vec<String> = spec
                .parameters
                .iter()
                .map(|p| {
                    let required = if p.required { "required" } else { "optional" };
                    format!("{} ({}, {})", p.name, p.param_type, required)
                })
                .collect();
            report.push_str(&format!("\nParameters: {}", parameters.join(", ")));
        }

        if let Some(trial_args) = arguments.get("args").filter(|a| !a.is_null()) {
            match tool.call(trial_args.clone()).await {
                Ok(result) => report.push_str(&format!("\nTrial run result: {}", result)),
                Err(err) => report.push_str(&format!("\nTrial run failed: {}", err)),
            }
        }

        report.push_str(&format!("\n\n```rhai\n{}\n```", tool.source()));
        Ok(report)
    }
}

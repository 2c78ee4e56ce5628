use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::memory::Memory;
use crate::models::tool::{ToolCall, ToolSpec};
use crate::providers::gateway::ProviderGateway;
use crate::synthesizer::{SandboxPolicy, SynthesisError, Synthesizer};
use crate::tools::base::Tool;
use crate::tools::final_answer::{
    AnswerTool, FinalAnswerTool, ANSWER_TOOL_NAME, FINAL_ANSWER_TOOL_NAME,
};
use crate::tools::registry::{EffectiveRegistry, ToolRegistry};

pub const DEFAULT_MAX_STEPS: usize = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that can use tools to solve tasks. \
When you need information or want to perform actions, use the provided tools. \
When you have the final answer, use the final_answer tool.";

/// Tools whose results may carry a tool declaration to install
pub const DEFAULT_CODE_GENERATING_TOOLS: [&str; 2] = ["create_tool", "custom_executor"];

const BUDGET_SUMMARY_PREFIX: &str =
    "I couldn't complete the task in the allowed number of steps. My progress so far:\n";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub system_prompt: String,
    pub code_generating_tools: Vec<String>,
    /// Upper bound for a single tool invocation
    pub tool_timeout: Option<Duration>,
    /// Limits for synthesized tools
    pub sandbox: SandboxPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            code_generating_tools: DEFAULT_CODE_GENERATING_TOOLS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            tool_timeout: None,
            sandbox: SandboxPolicy::default(),
        }
    }
}

/// Where a run is in the step loop
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// Number of completed steps
    Running(usize),
    Done(String),
    StepBudgetExceeded(String),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done(String),
    /// Not an error: carries a summary of the progress made
    StepBudgetExceeded(String),
}

impl RunOutcome {
    pub fn text(&self) -> &str {
        match self {
            RunOutcome::Done(text) | RunOutcome::StepBudgetExceeded(text) => text,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }
}

/// Agent drives a language model through tool calls until it produces a
/// final answer or runs out of steps
pub struct Agent {
    gateway: ProviderGateway,
    tools: Arc<ToolRegistry>,
    synthesizer: Synthesizer,
    config: AgentConfig,
}

impl Agent {
    pub fn builder(gateway: ProviderGateway) -> AgentBuilder {
        AgentBuilder::new(gateway)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    /// Tools shared by every run
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Begin a run with its own memory and dynamic tool overlay
    pub fn start(&self) -> AgentRun<'_> {
        let mut memory = Memory::new();
        memory.append_system(self.config.system_prompt.as_str());
        AgentRun {
            agent: self,
            memory,
            registry: EffectiveRegistry::new(Arc::clone(&self.tools)),
            state: RunState::Running(0),
            steps: 0,
            started: false,
        }
    }

    /// Run a task to completion
    pub async fn run(&self, task: &str) -> AgentResult<RunOutcome> {
        self.start().execute(task).await
    }

    fn is_code_generating(&self, tool_name: &str) -> bool {
        self.config
            .code_generating_tools
            .iter()
            .any(|name| name == tool_name)
    }
}

/// One task's pass through the step loop
pub struct AgentRun<'a> {
    agent: &'a Agent,
    memory: Memory,
    registry: EffectiveRegistry,
    state: RunState,
    steps: usize,
    started: bool,
}

impl AgentRun<'_> {
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn registry(&self) -> &EffectiveRegistry {
        &self.registry
    }

    /// Backend calls that completed in this run
    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Drive the task until a terminal tool is called or the step budget is
    /// spent. Only provider failures escape; everything else that goes wrong
    /// inside a step is reported to the model as text.
    pub async fn execute(&mut self, task: &str) -> AgentResult<RunOutcome> {
        if self.started {
            return Err(AgentError::Internal(
                "a run executes a single task; start a new run".to_string(),
            ));
        }
        self.started = true;
        self.memory.append_user(task);

        let max_steps = self.agent.config.max_steps;
        while let RunState::Running(completed) = self.state {
            if completed >= max_steps {
                let summary = self.budget_summary();
                warn!(max_steps, "step budget exhausted without a final answer");
                self.state = RunState::StepBudgetExceeded(summary.clone());
                return Ok(RunOutcome::StepBudgetExceeded(summary));
            }

            info!(step = completed + 1, max_steps, "agent step");
            if let Some(answer) = self.step(completed).await? {
                info!(steps = completed + 1, "final answer reached");
                self.state = RunState::Done(answer.clone());
                return Ok(RunOutcome::Done(answer));
            }
        }

        Err(AgentError::Internal("run already finished".to_string()))
    }

    /// One backend call and at most one tool dispatch. Returns the answer
    /// when a terminal tool was called.
    async fn step(&mut self, completed: usize) -> AgentResult<Option<String>> {
        let messages = self.memory.render();
        let specs = self.registry.effective_specs();
        let reply = self.agent.gateway.send(&messages, &specs).await?;
        self.steps = completed + 1;
        self.state = RunState::Running(self.steps);

        let calls = reply.tool_calls.len();
        let Some(call) = reply.tool_calls.into_iter().next() else {
            debug!("reply without tool call");
            self.memory.append_assistant(reply.text.unwrap_or_default());
            return Ok(None);
        };
        if calls > 1 {
            debug!(discarded = calls - 1, tool = %call.name, "only the first tool call is used");
        }

        self.memory.append_tool_call_notice(&call);

        let tool = self.registry.resolve(&call.name).ok();
        if let Some(answer) = terminal_answer(tool.as_deref(), &call) {
            self.memory.record_final_answer(answer.as_str());
            return Ok(Some(answer));
        }

        let (result, announcement) = self.dispatch(tool, &call).await;
        self.memory.append_tool_result(call.name.as_str(), result.as_str());
        self.memory
            .record_tool_call(call.name.as_str(), call.arguments, result);
        if let Some(announcement) = announcement {
            self.memory.append_assistant(announcement);
        }
        Ok(None)
    }

    /// Run the tool. Also returns the assistant message introducing a tool
    /// synthesized from the result, if any.
    async fn dispatch(
        &mut self,
        tool: Option<Arc<dyn Tool>>,
        call: &ToolCall,
    ) -> (String, Option<String>) {
        let Some(tool) = tool else {
            warn!(tool = %call.name, "model requested an unknown tool");
            return (format!("Error: Tool '{}' not found", call.name), None);
        };

        info!(tool = %call.name, "dispatching tool call");
        let mut result = invoke(tool, call.arguments.clone(), self.agent.config.tool_timeout).await;

        let mut announcement = None;
        if self.agent.is_code_generating(&call.name) {
            match self.install_generated_tool(&result).await {
                Ok(Some(spec)) => {
                    result.push_str(&format!(
                        "\n\nTool '{}' has been created and is now available for use.",
                        spec.name
                    ));
                    announcement = Some(format!(
                        "I've created a new tool called '{}' that {}",
                        spec.name, spec.description
                    ));
                }
                Ok(None) => {}
                Err(err) => result.push_str(&format!("\n\nFailed to create tool: {}", err)),
            }
        }
        (result, announcement)
    }

    /// Synthesize and register a tool from a code-generating tool's output.
    ///
    /// Instantiation evaluates script code, which may block or call the
    /// blocking host helpers, so it runs off the async workers.
    async fn install_generated_tool(
        &mut self,
        output: &str,
    ) -> Result<Option<ToolSpec>, SynthesisError> {
        let synthesizer = self.agent.synthesizer.clone();
        let output = output.to_string();
        let synthesized = tokio::task::spawn_blocking(move || synthesizer.synthesize(&output))
            .await
            .unwrap_or_else(|err| {
                Err(SynthesisError::Instantiation {
                    name: "generated tool".to_string(),
                    message: err.to_string(),
                })
            });

        match synthesized {
            Ok(tool) => {
                let spec = tool.spec();
                self.registry.register_dynamic(tool);
                info!(tool = %spec.name, "registered generated tool");
                Ok(Some(spec))
            }
            Err(SynthesisError::NoDeclaration) => Ok(None),
            Err(err) => {
                warn!(error = %err, "failed to create tool from generated code");
                Err(err)
            }
        }
    }

    fn budget_summary(&self) -> String {
        let progress: Vec<String> = self
            .memory
            .tool_call_steps()
            .into_iter()
            .map(|(name, result)| format!("{}: {}", name, result))
            .collect();
        format!("{}{}", BUDGET_SUMMARY_PREFIX, progress.join("\n"))
    }
}

/// The answer when `call` ends the run.
///
/// `final_answer` is always terminal and `answer` is terminal when a tool
/// by that name is registered. A registered tool without its own answer
/// hook falls back to the built-in argument rules.
fn terminal_answer(tool: Option<&dyn Tool>, call: &ToolCall) -> Option<String> {
    if let Some(answer) = tool.and_then(|t| t.final_answer(&call.arguments)) {
        return Some(answer);
    }
    match call.name.as_str() {
        FINAL_ANSWER_TOOL_NAME => FinalAnswerTool.final_answer(&call.arguments),
        ANSWER_TOOL_NAME if tool.is_some() => AnswerTool.final_answer(&call.arguments),
        _ => None,
    }
}

/// Invoke a tool on its own task so a panic or a timeout stays inside the step
async fn invoke(tool: Arc<dyn Tool>, arguments: Value, timeout: Option<Duration>) -> String {
    let mut handle = tokio::spawn(async move { tool.invoke(arguments).await });

    let joined = match timeout {
        None => (&mut handle).await,
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return format!(
                    "Error executing tool: timed out after {}s",
                    limit.as_secs_f64()
                );
            }
        },
    };

    joined.unwrap_or_else(|err| format!("Error executing tool: {}", err))
}

pub struct AgentBuilder {
    gateway: ProviderGateway,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new(gateway: ProviderGateway) -> Self {
        Self {
            gateway,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(Arc::new(tool));
        self
    }

    pub fn shared_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        for tool in tools {
            self.tools.register(tool);
        }
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    /// Mark a tool name as producing tool declarations
    pub fn code_generating_tool<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        if !self.config.code_generating_tools.contains(&name) {
            self.config.code_generating_tools.push(name);
        }
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = Some(timeout);
        self
    }

    pub fn sandbox(mut self, policy: SandboxPolicy) -> Self {
        self.config.sandbox = policy;
        self
    }

    pub fn build(mut self) -> Agent {
        if !self.tools.contains(FINAL_ANSWER_TOOL_NAME) {
            self.tools.register(Arc::new(FinalAnswerTool));
        }

        Agent {
            gateway: self.gateway,
            tools: Arc::new(self.tools),
            synthesizer: Synthesizer::new(self.config.sandbox.clone()),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::base::Reply;
    use crate::providers::mock::MockProvider;
    use crate::tools::base::FnTool;
    use async_trait::async_trait;
    use serde_json::json;

    fn agent_with(mock: &MockProvider) -> AgentBuilder {
        Agent::builder(ProviderGateway::new(Box::new(mock.clone())))
    }

    struct Sleeper;

    #[async_trait]
    impl Tool for Sleeper {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("sleeper", "Takes its time")
        }

        async fn call(&self, _arguments: Value) -> AgentResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("woke up".to_string())
        }
    }

    struct Panicker;

    #[async_trait]
    impl Tool for Panicker {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("panicker", "Always panics")
        }

        async fn call(&self, _arguments: Value) -> AgentResult<String> {
            panic!("boom")
        }
    }

    #[test]
    fn test_build_adds_final_answer() {
        let agent = agent_with(&MockProvider::default()).build();
        assert!(agent.tools().contains(FINAL_ANSWER_TOOL_NAME));
        assert_eq!(agent.config().max_steps, DEFAULT_MAX_STEPS);
        assert!(agent.is_code_generating("create_tool"));
        assert!(agent.is_code_generating("custom_executor"));
        assert!(!agent.is_code_generating("calculator"));
    }

    #[tokio::test]
    async fn test_start_appends_system_prompt() {
        let agent = agent_with(&MockProvider::default())
            .system_prompt("Be brief.")
            .build();
        let run = agent.start();
        assert_eq!(run.memory().messages().len(), 1);
        assert_eq!(run.memory().messages()[0].content, "Be brief.");
        assert_eq!(run.state(), &RunState::Running(0));
    }

    #[tokio::test]
    async fn test_text_reply_consumes_a_step() {
        let mock = MockProvider::new(vec![
            Reply::text("Let me think."),
            Reply::tool_call(ToolCall::new("final_answer", json!({"answer": "done"}))),
        ]);
        let agent = agent_with(&mock).build();
        let mut run = agent.start();

        let outcome = run.execute("task").await.unwrap();

        assert_eq!(outcome, RunOutcome::Done("done".into()));
        assert_eq!(run.state(), &RunState::Done("done".into()));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(run.memory().messages()[2].content, "Let me think.");
    }

    #[tokio::test]
    async fn test_execute_only_once() {
        let mock = MockProvider::repeating(Reply::tool_call(ToolCall::new(
            "final_answer",
            json!({"answer": "x"}),
        )));
        let agent = agent_with(&mock).build();
        let mut run = agent.start();
        run.execute("first").await.unwrap();
        assert!(matches!(
            run.execute("second").await,
            Err(AgentError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_timeout_is_recovered() {
        let mock = MockProvider::new(vec![
            Reply::tool_call(ToolCall::new("sleeper", json!({}))),
            Reply::tool_call(ToolCall::new("final_answer", json!({"answer": "ok"}))),
        ]);
        let agent = agent_with(&mock)
            .tool(Sleeper)
            .tool_timeout(Duration::from_millis(50))
            .build();
        let mut run = agent.start();

        let outcome = run.execute("wait").await.unwrap();

        assert_eq!(outcome.text(), "ok");
        assert_eq!(
            run.memory().tool_call_steps(),
            vec![("sleeper", "Error executing tool: timed out after 0.05s")]
        );
    }

    #[tokio::test]
    async fn test_panicking_tool_is_recovered() {
        let mock = MockProvider::new(vec![
            Reply::tool_call(ToolCall::new("panicker", json!({}))),
            Reply::tool_call(ToolCall::new("final_answer", json!({"answer": "ok"}))),
        ]);
        let agent = agent_with(&mock).tool(Panicker).build();
        let mut run = agent.start();

        run.execute("go").await.unwrap();

        let steps = run.memory().tool_call_steps();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].1.starts_with("Error executing tool: "), "{}", steps[0].1);
    }

    #[tokio::test]
    async fn test_custom_final_answer_is_kept() {
        let custom = FnTool::new(
            ToolSpec::new("final_answer", "custom").with_parameter("answer", "string", ""),
            |_| Ok(String::new()),
        );
        let agent = agent_with(&MockProvider::default()).tool(custom).build();
        let tool = agent.tools().get(FINAL_ANSWER_TOOL_NAME).unwrap();
        assert_eq!(tool.spec().description, "custom");
    }
}

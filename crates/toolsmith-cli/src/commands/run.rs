use anyhow::Result;
use console::style;
use toolsmith::agent::{Agent, RunOutcome};
use toolsmith::errors::{AgentError, AgentResult};
use toolsmith::providers::base::Provider;
use toolsmith::providers::factory::get_provider;
use toolsmith::providers::gateway::ProviderGateway;
use toolsmith::tools::{CreateToolTool, ScriptExecutorTool};

use crate::configuration::{Overrides, Settings};

pub const EXIT_DONE: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_BUDGET_EXCEEDED: i32 = 2;

/// Build an agent with the code tools, both confined by the configured sandbox
pub fn build_agent(settings: &Settings, provider: Box<dyn Provider>) -> Agent {
    let sandbox = settings.sandbox.clone();
    let gateway = ProviderGateway::with_retry(provider, settings.retry.to_config());

    Agent::builder(gateway)
        .config(settings.agent.to_config(sandbox.clone()))
        .tool(CreateToolTool::new(sandbox.clone()))
        .tool(ScriptExecutorTool::new(sandbox))
        .build()
}

pub fn exit_code(result: &AgentResult<RunOutcome>) -> i32 {
    match result {
        Ok(RunOutcome::Done(_)) => EXIT_DONE,
        Ok(RunOutcome::StepBudgetExceeded(_)) => EXIT_BUDGET_EXCEEDED,
        Err(_) => EXIT_FAILED,
    }
}

fn report(result: &AgentResult<RunOutcome>) {
    match result {
        Ok(RunOutcome::Done(answer)) => {
            println!("{}", style("answer").bold().green());
            println!("{}", answer);
        }
        Ok(RunOutcome::StepBudgetExceeded(summary)) => {
            println!("{}", style("step budget exceeded").bold().yellow());
            println!("{}", summary);
        }
        Err(AgentError::Provider(err)) => {
            eprintln!("{} {}", style("provider error:").bold().red(), err);
        }
        Err(err) => {
            eprintln!("{} {}", style("error:").bold().red(), err);
        }
    }
}

/// Run one task and return the process exit code
pub async fn execute(task: &str, overrides: Overrides) -> Result<i32> {
    let settings = Settings::load(&overrides)?;
    let provider_type = settings.provider.provider_type();
    let provider_config = settings.provider_config();
    let model = provider_config.model().to_string();
    let provider = get_provider(provider_config)?;
    let agent = build_agent(&settings, provider);

    println!(
        "{} {} {}",
        style("toolsmith").bold().cyan(),
        style(format!("{}/{}", provider_type, model)).dim(),
        style(format!("max steps {}", agent.config().max_steps)).dim()
    );
    println!("{} {}\n", style("task").bold(), task);

    let result = agent.run(task).await;
    report(&result);
    println!(
        "\n{}",
        style(format!(
            "tokens: prompt {}, completion {}",
            agent.gateway().last_prompt_tokens(),
            agent.gateway().last_completion_tokens()
        ))
        .dim()
    );

    Ok(exit_code(&result))
}

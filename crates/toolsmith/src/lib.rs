//! A tool-using agent: a language model is queried in a loop, the tool it
//! asks for is run, and the result is fed back until it gives a final answer
//! or the step budget runs out. Tools can also be written by the model itself
//! mid-run, compiled into a sandboxed script engine.

pub mod agent;
pub mod errors;
pub mod memory;
pub mod models;
pub mod providers;
pub mod synthesizer;
pub mod tools;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentRun, RunOutcome, RunState};
pub use errors::{AgentError, AgentResult};
pub use providers::gateway::ProviderGateway;
pub use tools::base::Tool;

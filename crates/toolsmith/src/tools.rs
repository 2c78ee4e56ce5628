//! The tool contract, the registries the orchestrator dispatches through, and
//! the built-in tools.

pub mod base;
pub mod final_answer;
pub mod registry;
pub mod script;

pub use base::{FnTool, Tool};
pub use final_answer::{AnswerTool, FinalAnswerTool};
pub use registry::{EffectiveRegistry, ToolRegistry};
pub use script::{CreateToolTool, ScriptExecutorTool};

use thiserror::Error;

use crate::providers::errors::ProviderError;

/// Failures raised while driving an agent run.
///
/// Everything except `Provider` is recovered inside a step and turned into
/// text for the model. A `Provider` error aborts the run.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    ExecutionError(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

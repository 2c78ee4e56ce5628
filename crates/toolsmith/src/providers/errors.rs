use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Backend failures, classified by whether repeating the call can help
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Only rate limiting is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

const RATE_LIMIT_ERROR_KINDS: [&str; 3] =
    ["rate_limit_exceeded", "rate_limit_error", "overloaded_error"];

/// Map a non-success HTTP response onto the three-way classification.
///
/// Error bodies that name a rate limit win over the status code, since some
/// gateways report throttling with a generic status.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("{} - {}", status, body.trim());

    if status == StatusCode::TOO_MANY_REQUESTS || names_rate_limit(body) {
        return ProviderError::RateLimited(message);
    }

    match status.as_u16() {
        400 | 404 | 413 | 422 => ProviderError::InvalidRequest(message),
        _ => ProviderError::Unknown(message),
    }
}

fn names_rate_limit(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let error = &value["error"];
    ["type", "code"].iter().any(|key| {
        error
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|kind| RATE_LIMIT_ERROR_KINDS.contains(&kind))
    })
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => classify_status(status, &err.to_string()),
            None => ProviderError::Unknown(err.to_string()),
        }
    }
}

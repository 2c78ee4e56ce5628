use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::base::{Provider, Reply};
use super::errors::ProviderResult;
use super::retry::RetryConfig;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

/// Wraps a backend with the retry policy and usage bookkeeping.
///
/// Rate-limited calls are retried up to `max_retries` times with jittered
/// exponential backoff; every other failure is returned immediately.
pub struct ProviderGateway {
    provider: Box<dyn Provider>,
    retry: RetryConfig,
    last_prompt_tokens: AtomicU32,
    last_completion_tokens: AtomicU32,
}

impl ProviderGateway {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self::with_retry(provider, RetryConfig::default())
    }

    pub fn with_retry(provider: Box<dyn Provider>, retry: RetryConfig) -> Self {
        Self {
            provider,
            retry,
            last_prompt_tokens: AtomicU32::new(0),
            last_completion_tokens: AtomicU32::new(0),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    pub fn last_prompt_tokens(&self) -> u32 {
        self.last_prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn last_completion_tokens(&self) -> u32 {
        self.last_completion_tokens.load(Ordering::Relaxed)
    }

    pub async fn send(&self, messages: &[Message], tools: &[ToolSpec]) -> ProviderResult<Reply> {
        self.send_with(messages, tools, |attempt| self.retry.delay_for(attempt))
            .await
    }

    /// `send` with a caller-supplied delay schedule
    async fn send_with<F>(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        delay_for: F,
    ) -> ProviderResult<Reply>
    where
        F: Fn(u32) -> Duration,
    {
        let mut retries = 0;
        loop {
            match self.provider.complete(messages, tools).await {
                Ok((reply, usage)) => {
                    if let Some(tokens) = usage.input_tokens {
                        self.last_prompt_tokens.store(tokens, Ordering::Relaxed);
                    }
                    if let Some(tokens) = usage.output_tokens {
                        self.last_completion_tokens.store(tokens, Ordering::Relaxed);
                    }
                    return Ok(reply);
                }
                Err(err) if err.is_retryable() && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = delay_for(retries);
                    tracing::warn!(
                        attempt = retries,
                        max_retries = self.retry.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "rate limited, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(
                            max_retries = self.retry.max_retries,
                            error = %err,
                            "retries exhausted, rate limit persists"
                        );
                    } else {
                        tracing::error!(error = %err, "provider call failed");
                    }
                    return Err(err);
                }
            }
        }
    }
}

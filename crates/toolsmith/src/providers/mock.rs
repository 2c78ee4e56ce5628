use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::base::{Provider, Reply, Usage};
use super::errors::ProviderResult;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

/// What the mock saw on one `complete` call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// A provider that returns pre-configured replies, for tests and dry runs
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<ProviderResult<Reply>>>>,
    fallback: Option<ProviderResult<Reply>>,
    usage: Usage,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    /// Replies are returned in order; once exhausted an empty text reply is returned
    pub fn new(responses: Vec<Reply>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<ProviderResult<Reply>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(results.into())),
            ..Self::default()
        }
    }

    /// Always answer with the same reply
    pub fn repeating(reply: Reply) -> Self {
        Self {
            fallback: Some(Ok(reply)),
            ..Self::default()
        }
    }

    /// Used once the scripted replies run out
    pub fn with_fallback(mut self, result: ProviderResult<Reply>) -> Self {
        self.fallback = Some(result);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Shared view of the recorded calls; clones of the mock share it too
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> ProviderResult<(Reply, Usage)> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());

        let result = match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => Ok(Reply::text("")),
        };
        result.map(|reply| (reply, self.usage.clone()))
    }
}

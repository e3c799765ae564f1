//! Mock provider for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use eduplanner_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, TokenUsage};

use crate::error::ProviderError;

/// A mock LLM provider for exercising the planner without real API calls.
///
/// Responses are chosen by the first prompt substring that matches, in
/// insertion order. Scripted failures are returned, one per call, before any
/// response.
pub struct MockProvider {
    /// Prompt substring → response text.
    responses: Vec<(String, String)>,
    /// Default response if no prompt matches.
    default_response: String,
    /// Errors to return before answering normally.
    failures: Mutex<VecDeque<ProviderError>>,
    /// Every call fails as if the server were down.
    unreachable: bool,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with the given prompt→response mappings.
    pub fn new(responses: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            default_response: String::new(),
            failures: Mutex::new(VecDeque::new()),
            unreachable: false,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(Vec::new()).with_default_response(response)
    }

    /// A mock that behaves like an unreachable server.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_response = response.to_string();
        self
    }

    /// Queue an error for the next call that is not already scripted.
    pub fn fail_next(self, error: ProviderError) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if self.unreachable {
            return Err(ProviderError::NetworkError("mock provider is unreachable".into()).into());
        }
        let scripted = self.failures.lock().ok().and_then(|mut f| f.pop_front());
        if let Some(error) = scripted {
            return Err(error.into());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }
}

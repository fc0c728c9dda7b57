//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use samplecoach_core::error::ProviderError;
use samplecoach_core::traits::{ChatProvider, ChatRequest, ChatResponse, ModelInfo, TokenUsage};

/// A mock chat provider for exercising the engine without real API calls.
///
/// Returns configurable replies based on prompt content matching, and can
/// be told to answer a number of calls with a rate-limit error first.
pub struct MockProvider {
    /// Map of prompt substring → reply text.
    responses: HashMap<String, String>,
    /// Reply if no prompt matches.
    default_response: String,
    /// Calls still to be rejected as rate limited; `u32::MAX` means always.
    rate_limits_remaining: AtomicU32,
    latency: Duration,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<ChatRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with the given prompt→reply mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "yes".to_string(),
            rate_limits_remaining: AtomicU32::new(0),
            latency: Duration::ZERO,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same reply.
    pub fn with_fixed_response(response: &str) -> Self {
        let mut provider = Self::new(HashMap::new());
        provider.default_response = response.to_string();
        provider
    }

    /// Reject the next `count` calls as rate limited.
    pub fn rate_limited_for(self, count: u32) -> Self {
        self.rate_limits_remaining.store(count, Ordering::Relaxed);
        self
    }

    /// Reject every call as rate limited.
    pub fn always_rate_limited(self) -> Self {
        self.rate_limited_for(u32::MAX)
    }

    /// Sleep this long before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn take_rate_limit(&self) -> bool {
        self.rate_limits_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// About four bytes per token, for `copies` copies of `text`.
fn rough_token_count(text: &str, copies: u32) -> u32 {
    u32::try_from(text.len() / 4)
        .unwrap_or(u32::MAX)
        .saturating_mul(copies)
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.take_rate_limit() {
            return Err(ProviderError::RateLimited { retry_after_ms: 0 }.into());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let prompt_tokens = rough_token_count(&request.prompt, 1);
        let completion_tokens = rough_token_count(&content, request.n);

        Ok(ChatResponse {
            completions: vec![content; request.n as usize],
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens.saturating_add(completion_tokens),
            },
            latency_ms: self.latency.as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samplecoach_core::error::is_rate_limited;

    fn request(prompt: &str, n: u32) -> ChatRequest {
        ChatRequest {
            model: "mock".into(),
            system_prompt: String::new(),
            prompt: prompt.into(),
            n,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("No, it does not.");
        let response = provider.complete(&request("anything", 3)).await.unwrap();
        assert_eq!(response.completions, vec!["No, it does not."; 3]);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().n, 3);
    }

    #[tokio::test]
    async fn prompt_matching() {
        let mut responses = HashMap::new();
        responses.insert("grammar".to_string(), "no".to_string());
        responses.insert("tone".to_string(), "yes".to_string());
        let provider = MockProvider::new(responses);

        let resp = provider.complete(&request("Any grammar errors?", 1)).await.unwrap();
        assert_eq!(resp.completions, vec!["no"]);

        let resp = provider.complete(&request("Is the tone right?", 1)).await.unwrap();
        assert_eq!(resp.completions, vec!["yes"]);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn rate_limits_then_succeeds() {
        let provider = MockProvider::with_fixed_response("yes").rate_limited_for(2);

        for _ in 0..2 {
            let err = provider.complete(&request("p", 1)).await.unwrap_err();
            assert!(is_rate_limited(&err));
        }
        assert!(provider.complete(&request("p", 1)).await.is_ok());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn always_rate_limited_never_answers() {
        let provider = MockProvider::with_fixed_response("yes").always_rate_limited();
        for _ in 0..10 {
            assert!(provider.complete(&request("p", 1)).await.is_err());
        }
    }

    #[test]
    fn token_estimate_saturates() {
        assert_eq!(rough_token_count("No, it does not.", 3), 12);
        assert_eq!(rough_token_count("No, it does not.", u32::MAX), u32::MAX);
        assert_eq!(rough_token_count("", u32::MAX), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_simulated() {
        let provider = MockProvider::with_fixed_response("yes").with_latency(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        provider.complete(&request("p", 1)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}

//! The text-generation provider trait.
//!
//! Implemented by the `samplecoach-providers` crate; the dispatcher only
//! ever talks to a `dyn ChatProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for chat-completion backends that answer evaluation prompts.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Request `request.n` completions for a prompt.
    ///
    /// Rate limiting must surface as [`crate::error::ProviderError::RateLimited`]
    /// so the dispatcher can back off and retry.
    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// A single chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier (e.g. "gpt-3.5-turbo").
    pub model: String,
    /// System message describing the evaluator's role.
    pub system_prompt: String,
    /// The substituted user prompt.
    pub prompt: String,
    /// Number of completions to generate.
    pub n: u32,
}

/// The completions returned for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Text of each returned choice, in API order.
    pub completions: Vec<String>,
    /// Model that actually answered.
    pub model: String,
    #[serde(default)]
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

/// Default system prompt for evaluation requests.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert copywriter who carefully evaluates passages to answer questions about them. Each passage will have a goal, a response, and a question about it.";

/// Default user prompt template.
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Goal: $PROMPT\n\nResponse:\n```\n$SAMPLE\n```\n\n$QUESTION";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

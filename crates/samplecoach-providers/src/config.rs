//! Run configuration and provider factory.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use samplecoach_core::dispatcher::DispatchConfig;
use samplecoach_core::engine::EngineConfig;
use samplecoach_core::planner::{WindowLimits, DEFAULT_TOKENS_PER_WINDOW};
use samplecoach_core::retry::RetryPolicy;
use samplecoach_core::traits::{
    ChatProvider, DEFAULT_MODEL, DEFAULT_PROMPT_TEMPLATE, DEFAULT_SYSTEM_PROMPT,
};

use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;

/// Configuration for the chat-completion backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    /// Offline provider that answers every prompt with a fixed reply.
    Mock {
        #[serde(default = "default_mock_response")]
        response: String,
        /// Calls rejected as rate limited before the mock starts answering.
        #[serde(default)]
        rate_limited_calls: u32,
        #[serde(default)]
        latency_ms: u64,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Mock {
                response,
                rate_limited_calls,
                latency_ms,
            } => f
                .debug_struct("Mock")
                .field("response", response)
                .field("rate_limited_calls", rate_limited_calls)
                .field("latency_ms", latency_ms)
                .finish(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::OpenAI {
            api_key: String::new(),
            base_url: None,
            org_id: None,
        }
    }
}

fn default_mock_response() -> String {
    "yes".to_string()
}

/// Account rate tier, which fixes the number of requests per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawRateTier", into = "RawRateTier")]
pub enum RateTier {
    /// Free trial accounts: 20 requests per minute.
    Free,
    /// Paid accounts during their first 48 hours: 60 requests per minute.
    Trial,
    /// Paid accounts: 3500 requests per minute.
    #[default]
    Paid,
    /// An explicit request limit.
    Custom(usize),
}

impl RateTier {
    pub fn requests_per_window(self) -> usize {
        match self {
            RateTier::Free => 20,
            RateTier::Trial => 60,
            RateTier::Paid => 3500,
            RateTier::Custom(n) => n,
        }
    }
}

impl FromStr for RateTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(RateTier::Free),
            "trial" => Ok(RateTier::Trial),
            "paid" => Ok(RateTier::Paid),
            other => other.parse::<usize>().map(RateTier::Custom).map_err(|_| {
                format!("unknown rate tier '{s}': expected free, trial, paid or a number")
            }),
        }
    }
}

impl std::fmt::Display for RateTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateTier::Free => write!(f, "free"),
            RateTier::Trial => write!(f, "trial"),
            RateTier::Paid => write!(f, "paid"),
            RateTier::Custom(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRateTier {
    Requests(usize),
    Name(String),
}

impl TryFrom<RawRateTier> for RateTier {
    type Error = String;

    fn try_from(raw: RawRateTier) -> Result<Self, Self::Error> {
        match raw {
            RawRateTier::Requests(n) => Ok(RateTier::Custom(n)),
            RawRateTier::Name(name) => name.parse(),
        }
    }
}

impl From<RateTier> for RawRateTier {
    fn from(tier: RateTier) -> Self {
        match tier {
            RateTier::Custom(n) => RawRateTier::Requests(n),
            named => RawRateTier::Name(named.to_string()),
        }
    }
}

/// Top-level samplecoach configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplecoachConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Model asked every question.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Template with `$PROMPT`, `$SAMPLE` and `$QUESTION` placeholders.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default)]
    pub rate_tier: RateTier,
    /// Estimated prompt tokens allowed per window.
    #[serde(default = "default_tokens_per_window")]
    pub tokens_per_window: u64,
    /// Length of one rate-limit window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Max requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Retries after a rate-limit response.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Base of the exponential backoff in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}
fn default_tokens_per_window() -> u64 {
    DEFAULT_TOKENS_PER_WINDOW
}
fn default_window_secs() -> u64 {
    60
}
fn default_concurrency() -> usize {
    50
}
fn default_retries() -> u32 {
    5
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./samplecoach-results")
}

impl Default for SamplecoachConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            prompt_template: default_prompt_template(),
            rate_tier: RateTier::default(),
            tokens_per_window: default_tokens_per_window(),
            window_secs: default_window_secs(),
            concurrency: default_concurrency(),
            max_retries: default_retries(),
            retry_base_delay_ms: default_retry_delay(),
            output_dir: default_output_dir(),
        }
    }
}

impl SamplecoachConfig {
    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.rate_tier.requests_per_window() == 0 {
            anyhow::bail!("rate_tier must allow at least 1 request per window");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.window_secs == 0 {
            anyhow::bail!("window_secs must be greater than 0");
        }
        if self.tokens_per_window == 0 {
            anyhow::bail!("tokens_per_window must be greater than 0");
        }
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dispatch: DispatchConfig {
                window: Duration::from_secs(self.window_secs),
                concurrency: self.concurrency,
                retry: RetryPolicy::new(
                    self.max_retries,
                    Duration::from_millis(self.retry_base_delay_ms),
                ),
                model: self.model.clone(),
                system_prompt: self.system_prompt.clone(),
            },
            limits: WindowLimits::new(self.rate_tier.requests_per_window())
                .with_max_tokens(self.tokens_per_window),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        // Substituted values are not scanned again.
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        mock @ ProviderConfig::Mock { .. } => mock.clone(),
    }
}

/// Apply API key overrides. `SAMPLECOACH_OPENAI_KEY` always wins;
/// `OPENAI_API_KEY` only fills in a key that is still empty.
fn apply_env_overrides(config: &mut SamplecoachConfig, var: impl Fn(&str) -> Option<String>) {
    if let ProviderConfig::OpenAI { api_key, .. } = &mut config.provider {
        if let Some(key) = var("SAMPLECOACH_OPENAI_KEY") {
            *api_key = key;
        } else if api_key.is_empty() {
            if let Some(key) = var("OPENAI_API_KEY") {
                *api_key = key;
            }
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `samplecoach.toml` in the current directory
/// 2. `~/.config/samplecoach/config.toml`
///
/// Environment variable overrides: `SAMPLECOACH_OPENAI_KEY`, then `OPENAI_API_KEY`.
pub fn load_config() -> Result<SamplecoachConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SamplecoachConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("samplecoach.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SamplecoachConfig::default(),
    };

    config.provider = resolve_provider_config(&config.provider);
    apply_env_overrides(&mut config, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    });

    Ok(config)
}

/// Parse a TOML string into a `SamplecoachConfig`.
pub fn parse_config_str(content: &str) -> Result<SamplecoachConfig> {
    Ok(toml::from_str::<SamplecoachConfig>(content)?)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("samplecoach"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn ChatProvider>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            if api_key.is_empty() {
                anyhow::bail!(
                    "no OpenAI API key configured; set SAMPLECOACH_OPENAI_KEY or OPENAI_API_KEY"
                );
            }
            Ok(Box::new(OpenAiProvider::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
            )?))
        }
        ProviderConfig::Mock {
            response,
            rate_limited_calls,
            latency_ms,
        } => Ok(Box::new(
            MockProvider::with_fixed_response(response)
                .rate_limited_for(*rate_limited_calls)
                .with_latency(Duration::from_millis(*latency_ms)),
        )),
    }
}

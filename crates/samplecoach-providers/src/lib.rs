//! samplecoach-providers — chat-completion API integrations.
//!
//! Implements the `ChatProvider` trait for OpenAI and an offline mock, and
//! loads the run configuration that selects between them.

pub mod config;
pub mod mock;
pub mod openai;

pub use config::{
    create_provider, load_config, load_config_from, ProviderConfig, RateTier, SamplecoachConfig,
};
pub use samplecoach_core::error::ProviderError;

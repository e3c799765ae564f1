//! eduplanner-providers: LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for Ollama, OpenAI-compatible
//! endpoints (including OpenRouter) and an in-process mock, plus the
//! configuration file that selects between them.

mod chat;
pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, load_config_from, EduPlannerConfig, ProviderConfig};
pub use error::ProviderError;

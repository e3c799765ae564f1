//! Configuration file and provider factory.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use eduplanner_core::engine::SessionConfig;
use eduplanner_core::service::ServiceSettings;
use eduplanner_core::traits::LlmProvider;

use crate::mock::MockProvider;
use crate::ollama::{OllamaProvider, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::openai::OpenAiProvider;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG: &str = "eduplanner.toml";

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Canned responses, for demos and tests.
    Mock {
        /// Prompt substring → response, matched in key order.
        #[serde(default)]
        responses: BTreeMap<String, String>,
        #[serde(default)]
        default_response: String,
        /// Fail every call as if the server were down.
        #[serde(default)]
        unreachable: bool,
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
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock {
                responses,
                unreachable,
                ..
            } => f
                .debug_struct("Mock")
                .field("responses", &responses.len())
                .field("unreachable", unreachable)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Top-level eduplanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EduPlannerConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Where ledgers and question banks live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Where response caches live.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Rounds per planning session.
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Pause after each optimize step, in milliseconds.
    #[serde(default = "default_optimize_pause")]
    pub optimize_pause_ms: u64,
    /// Lifetime of cached optimizer and analyst responses.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Maximum entries per response cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}
fn default_rounds() -> u32 {
    3
}
fn default_optimize_pause() -> u64 {
    1000
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_cache_capacity() -> usize {
    eduplanner_core::cache::DEFAULT_CAPACITY
}

impl Default for EduPlannerConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            rounds: default_rounds(),
            optimize_pause_ms: default_optimize_pause(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl EduPlannerConfig {
    /// Storage and session settings for the planner service.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            data_dir: self.data_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_capacity: self.cache_capacity,
            session: SessionConfig {
                rounds: self.rounds,
                optimize_pause: Duration::from_millis(self.optimize_pause_ms),
                ..SessionConfig::default()
            },
        }
    }

    /// The named provider's configuration. An unconfigured `ollama` falls
    /// back to the local default endpoint.
    pub fn provider(&self, name: &str) -> Result<ProviderConfig> {
        match self.providers.get(name) {
            Some(config) => Ok(config.clone()),
            None if name == "ollama" => Ok(ProviderConfig::Ollama {
                base_url: default_ollama_url(),
            }),
            None => anyhow::bail!(
                "provider '{name}' not configured. Add it to {LOCAL_CONFIG} or run `eduplanner init`"
            ),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
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
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        mock @ ProviderConfig::Mock { .. } => mock.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `eduplanner.toml` in the current directory
/// 2. `~/.config/eduplanner/config.toml`
///
/// Environment variable override: `EDUPLANNER_OPENAI_KEY`.
pub fn load_config() -> Result<EduPlannerConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<EduPlannerConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(LOCAL_CONFIG);
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
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<EduPlannerConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => EduPlannerConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("EDUPLANNER_OPENAI_KEY") {
        config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let Some(ProviderConfig::OpenAI { api_key, .. }) = config.providers.get_mut("openai") {
            *api_key = key;
        }
    }

    // Resolve env vars in all provider configs
    let resolved: HashMap<String, ProviderConfig> = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.providers = resolved;

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("eduplanner"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiProvider::new(api_key, base_url.clone(), org_id.clone())?),
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)?),
        ProviderConfig::Mock {
            responses,
            default_response,
            unreachable,
        } => {
            if *unreachable {
                Arc::new(MockProvider::unreachable())
            } else {
                let pairs = responses.iter().map(|(k, v)| (k.clone(), v.clone()));
                Arc::new(MockProvider::new(pairs).with_default_response(default_response))
            }
        }
    };
    Ok(provider)
}

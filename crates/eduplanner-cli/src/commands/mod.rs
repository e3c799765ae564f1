pub mod evaluate;
pub mod history;
pub mod init;
pub mod optimize;
pub mod questions;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use eduplanner_core::service::PlannerService;
use eduplanner_providers::{create_provider, load_config_from};

/// Build the planner service from the config file and its default provider.
pub(crate) fn planner(config_path: Option<PathBuf>) -> Result<PlannerService> {
    let config = load_config_from(config_path.as_deref())?;
    let provider_config = config.provider(&config.default_provider)?;
    let provider = create_provider(&provider_config)?;
    tracing::debug!(
        provider = %config.default_provider,
        model = %config.default_model,
        "using provider"
    );
    Ok(PlannerService::new(
        provider,
        &config.default_model,
        config.service_settings(),
    ))
}

pub(crate) fn read_plan(path: &Path) -> Result<String> {
    let plan = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan: {}", path.display()))?;
    anyhow::ensure!(!plan.trim().is_empty(), "plan file is empty: {}", path.display());
    Ok(plan)
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

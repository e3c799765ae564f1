//! LLM-backed evaluator, optimizer and analyst.
//!
//! Each agent renders a prompt, calls the provider through a [`ModelClient`]
//! and decodes the reply with [`crate::parser`]. The optimizer and analyst
//! memoize their results in a [`TtlCache`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::{cache_key, truncated_key, TtlCache};
use crate::model::{AnalystReport, OptimizeResult, Question, ScoreSet};
use crate::parser::{parse_analyst_report, parse_optimize_result, parse_scores};
use crate::prompts::{analyst_prompt, evaluator_prompt, optimizer_prompt, SYSTEM_PROMPT};
use crate::skill::SkillProfile;
use crate::traits::{Analyst, Evaluator, GenerateRequest, LlmProvider, Optimizer};

/// Optimizer cache keys only look at this many leading characters of the
/// plan and of the feedback.
pub const OPTIMIZE_KEY_CHARS: usize = 100;

/// Analyst input is cut to this many characters before prompting.
pub const ANALYST_EXCERPT_CHARS: usize = 1200;

/// Maximum misconceptions requested from the analyst.
pub const ANALYST_MAX_ITEMS: usize = 6;

const EVALUATOR_TEMPERATURE: f64 = 0.0;
const OPTIMIZER_TEMPERATURE: f64 = 0.7;
const ANALYST_TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 4096;

/// A provider bound to a model and token limit.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` and return the trimmed response text.
    pub async fn complete(&self, prompt: String, temperature: f64) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            max_tokens: MAX_TOKENS,
            temperature,
        };
        let response = self.provider.generate(&request).await?;
        tracing::debug!(
            provider = self.provider.name(),
            model = %response.model,
            latency_ms = response.latency_ms,
            tokens = response.token_usage.total_tokens,
            "model call complete"
        );
        Ok(response.content.trim().to_string())
    }
}

/// Evaluator that asks the model for CIDDP scores.
pub struct LlmEvaluator {
    client: ModelClient,
}

impl LlmEvaluator {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        plan: &str,
        skill: &SkillProfile,
        sample_questions: &[Question],
    ) -> Result<(ScoreSet, String)> {
        let prompt = evaluator_prompt(plan, &skill.summary(), sample_questions);
        let raw = self.client.complete(prompt, EVALUATOR_TEMPERATURE).await?;
        let scores = parse_scores(&raw);
        if scores.is_empty() {
            tracing::warn!("evaluator output contained no scores");
        }
        Ok((scores, raw))
    }
}

#[derive(Debug, Error)]
#[error("optimizer output contained no JSON object")]
struct UndecodableOutput;

/// Optimizer that asks the model for a revised plan.
///
/// Decoded results are cached under the first [`OPTIMIZE_KEY_CHARS`]
/// characters of the plan and feedback. Undecodable output is not cached and
/// yields the unchanged plan.
pub struct LlmOptimizer {
    client: ModelClient,
    cache: Mutex<TtlCache>,
    ttl: Duration,
}

impl LlmOptimizer {
    pub fn new(client: ModelClient, cache: TtlCache, ttl: Duration) -> Self {
        Self {
            client,
            cache: Mutex::new(cache),
            ttl,
        }
    }
}

#[async_trait]
impl Optimizer for LlmOptimizer {
    async fn optimize(
        &self,
        plan: &str,
        feedback: &str,
        skill: &SkillProfile,
    ) -> Result<OptimizeResult> {
        let key = truncated_key(&[plan, feedback], OPTIMIZE_KEY_CHARS);
        let mut cache = self.cache.lock().await;
        let outcome = cache
            .get_or_compute(&key, self.ttl, || async {
                let prompt = optimizer_prompt(plan, &skill.summary(), feedback);
                let raw = self.client.complete(prompt, OPTIMIZER_TEMPERATURE).await?;
                let result = parse_optimize_result(&raw).ok_or(UndecodableOutput)?;
                anyhow::Ok(result)
            })
            .await;

        match outcome {
            Err(e) if e.is::<UndecodableOutput>() => {
                tracing::warn!("{e}; keeping the current plan");
                Ok(OptimizeResult::unchanged(plan))
            }
            other => other,
        }
    }
}

/// Analyst that asks the model for likely misconceptions.
pub struct LlmAnalyst {
    client: ModelClient,
    cache: Mutex<TtlCache>,
    ttl: Duration,
}

impl LlmAnalyst {
    pub fn new(client: ModelClient, cache: TtlCache, ttl: Duration) -> Self {
        Self {
            client,
            cache: Mutex::new(cache),
            ttl,
        }
    }
}

/// First [`ANALYST_EXCERPT_CHARS`] characters of `text`, marked with a
/// trailing `"\n..."` when cut.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() > ANALYST_EXCERPT_CHARS {
        let head: String = text.chars().take(ANALYST_EXCERPT_CHARS).collect();
        format!("{head}\n...")
    } else {
        text.to_string()
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    async fn analyze_errors(
        &self,
        text: &str,
        skill: &SkillProfile,
        focus_areas: &[String],
    ) -> Result<AnalystReport> {
        let excerpt = excerpt(text);
        let summary = skill.summary();
        let key = cache_key(&json!({
            "excerpt": excerpt,
            "skill": summary,
            "focus_areas": focus_areas,
        }));

        let mut cache = self.cache.lock().await;
        cache
            .get_or_compute(&key, self.ttl, || async {
                let prompt = analyst_prompt(&excerpt, &summary, focus_areas, ANALYST_MAX_ITEMS);
                let raw = self.client.complete(prompt, ANALYST_TEMPERATURE).await?;
                anyhow::Ok(parse_analyst_report(&raw))
            })
            .await
    }
}

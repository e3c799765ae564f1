//! Core trait definitions: the LLM provider seam and the three agent
//! collaborators driven by the iteration engine.
//!
//! Providers are implemented in `eduplanner-providers`; the LLM-backed
//! agents live in [`crate::agents`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{AnalystReport, OptimizeResult, Question, ScoreSet};
use crate::skill::SkillProfile;

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that complete prompts.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "ollama").
    fn name(&self) -> &str;

    /// Complete a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
}

/// Request to complete a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "deepseek-r1:latest").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Response from a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Agent collaborators
// ---------------------------------------------------------------------------

/// Scores a lesson plan against the CIDDP rubric.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Returns the parsed scores (empty if unparsable) and the raw model text.
    async fn evaluate(
        &self,
        plan: &str,
        skill: &SkillProfile,
        sample_questions: &[Question],
    ) -> anyhow::Result<(ScoreSet, String)>;
}

/// Proposes an improved lesson plan from feedback.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn optimize(
        &self,
        plan: &str,
        feedback: &str,
        skill: &SkillProfile,
    ) -> anyhow::Result<OptimizeResult>;
}

/// Lists likely learner misconceptions for a plan excerpt.
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn analyze_errors(
        &self,
        excerpt: &str,
        skill: &SkillProfile,
        focus_areas: &[String],
    ) -> anyhow::Result<AnalystReport>;
}

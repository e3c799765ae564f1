//! Session report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{OptimizeResult, ScoreSet};

/// Lines starting with this prefix are pitfall notes appended to a plan in
/// an earlier round and are left out of the outline.
const PITFALL_PREFIX: &str = "Common Pitfalls:";

/// What happened in one round of the iteration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number.
    pub round: u32,
    /// The plan that was evaluated this round.
    pub plan: String,
    /// CIDDP mean of `scores` (0.0 for an offline round).
    pub score: f64,
    pub scores: ScoreSet,
    #[serde(default)]
    pub feedback: String,
    /// Scores were estimated from quiz performance.
    #[serde(default)]
    pub estimated: bool,
    /// The evaluator could not be reached; nothing else ran this round.
    #[serde(default)]
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizeResult>,
    #[serde(default)]
    pub misconceptions: Vec<String>,
}

impl RoundRecord {
    /// Placeholder for a round whose evaluation failed to connect.
    pub fn offline(round: u32, plan: &str) -> Self {
        Self {
            round,
            plan: plan.to_string(),
            score: 0.0,
            scores: ScoreSet::new(),
            feedback: String::new(),
            estimated: false,
            offline: true,
            optimization: None,
            misconceptions: Vec::new(),
        }
    }
}

/// The outcome of a full planning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub user: String,
    pub created_at: DateTime<Utc>,
    /// Every round in order, offline rounds included.
    pub rounds: Vec<RoundRecord>,
    /// Distinct misconception lists collected across rounds.
    pub pitfalls: Vec<Vec<String>>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl SessionReport {
    /// The highest-scoring round; the earliest wins ties.
    pub fn best_round(&self) -> Option<&RoundRecord> {
        self.rounds
            .iter()
            .reduce(|best, r| if r.score > best.score { r } else { best })
    }

    /// The working plan at the end of the session: the last optimizer
    /// replacement or the initial plan.
    pub fn final_plan(&self) -> Option<&str> {
        self.rounds
            .iter()
            .rev()
            .find_map(|r| r.optimization.as_ref().and_then(|o| o.replacement_plan()))
            .or_else(|| self.rounds.first().map(|r| r.plan.as_str()))
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Non-empty, trimmed plan lines for display, with earlier pitfall notes
/// removed and numbered items indented.
pub fn plan_outline(plan: &str) -> Vec<String> {
    plan.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(PITFALL_PREFIX))
        .map(|l| {
            let mut chars = l.chars();
            let numbered = matches!(
                (chars.next(), chars.next()),
                (Some(d), Some('.')) if d.is_ascii_digit()
            );
            if numbered {
                format!("  {l}")
            } else {
                l.to_string()
            }
        })
        .collect()
}

//! Core data model types for eduplanner.
//!
//! These are the types that flow through the parser, the ledger, the cache
//! and the iteration engine: rubric scores, plan entries, optimizer and
//! analyst results, and quiz questions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// One of the five CIDDP rubric criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criterion {
    Clarity,
    Integrity,
    Depth,
    Practicality,
    Pertinence,
}

impl Criterion {
    /// All criteria in rubric order.
    pub const ALL: [Criterion; 5] = [
        Criterion::Clarity,
        Criterion::Integrity,
        Criterion::Depth,
        Criterion::Practicality,
        Criterion::Pertinence,
    ];

    /// Canonical name used as the key in a [`ScoreSet`].
    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Clarity => "Clarity",
            Criterion::Integrity => "Integrity",
            Criterion::Depth => "Depth",
            Criterion::Practicality => "Practicality",
            Criterion::Pertinence => "Pertinence",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rubric scores keyed by criterion name.
///
/// Known criteria use their canonical names. Labels the parser could not map
/// are kept verbatim, so a set may hold more than five keys. An empty set
/// means the model output could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSet(BTreeMap<String, i64>);

impl ScoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known criterion set to the same value.
    pub fn uniform(value: i64) -> Self {
        let mut set = Self::new();
        for criterion in Criterion::ALL {
            set.set(criterion, value);
        }
        set
    }

    pub fn set(&mut self, criterion: Criterion, value: i64) {
        self.0.insert(criterion.as_str().to_string(), value);
    }

    /// Insert under an arbitrary label (used for unrecognized tags).
    pub fn insert(&mut self, label: impl Into<String>, value: i64) {
        self.0.insert(label.into(), value);
    }

    pub fn get(&self, criterion: Criterion) -> Option<i64> {
        self.0.get(criterion.as_str()).copied()
    }

    pub fn get_label(&self, label: &str) -> Option<i64> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when all five rubric criteria are present.
    pub fn is_complete(&self) -> bool {
        Criterion::ALL.iter().all(|c| self.get(*c).is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i64)> for ScoreSet {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One scored iteration of a user's lesson plan.
///
/// Entries are appended to the ledger and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// The lesson plan text that was scored.
    #[serde(default)]
    pub plan: String,
    /// CIDDP mean over `scores`.
    #[serde(default)]
    pub score: f64,
    /// Per-criterion scores.
    #[serde(default)]
    pub scores: ScoreSet,
    /// 1-based round number within the session that produced it.
    #[serde(default)]
    pub iteration: u32,
    /// Optimizer output that accompanied this entry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_optimization: Option<OptimizeResult>,
}

impl PlanEntry {
    pub fn new(plan: impl Into<String>, scores: ScoreSet, iteration: u32) -> Self {
        let score = crate::statistics::ciddp_score(&scores);
        Self {
            plan: plan.into(),
            score,
            scores,
            iteration,
            last_optimization: None,
        }
    }
}

/// A single change proposed by the optimizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Structured optimizer output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// Replacement lesson plan. Empty when the optimizer produced none.
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    /// Areas the optimizer suggests focusing on next.
    #[serde(default)]
    pub focus_next: Vec<String>,
    /// Practice exercise, kept as free-form JSON.
    #[serde(default)]
    pub exercise: serde_json::Value,
    /// Score reported by the optimizer itself, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl OptimizeResult {
    /// The result used when the optimizer output cannot be decoded: the
    /// original plan, unchanged.
    pub fn unchanged(plan: &str) -> Self {
        Self {
            plan: plan.to_string(),
            exercise: serde_json::Value::Object(Default::default()),
            ..Default::default()
        }
    }

    /// A replacement plan worth adopting, if the optimizer produced one.
    pub fn replacement_plan(&self) -> Option<&str> {
        let plan = self.plan.trim();
        (!plan.is_empty()).then_some(self.plan.as_str())
    }

    /// Focus areas for the analyst: `focus_next` if present, otherwise the
    /// areas named by the improvements. Trimmed, non-empty, at most `limit`.
    pub fn focus_areas(&self, limit: usize) -> Vec<String> {
        let raw: Vec<&str> = if self.focus_next.iter().any(|f| !f.trim().is_empty()) {
            self.focus_next.iter().map(String::as_str).collect()
        } else {
            self.improvements
                .iter()
                .filter_map(|i| i.area.as_deref())
                .collect()
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(limit)
            .map(str::to_string)
            .collect()
    }
}

/// Misconceptions reported by the analyst, plus the raw model text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystReport {
    #[serde(default)]
    pub misconceptions: Vec<String>,
    #[serde(default)]
    pub raw: String,
}

/// Quiz difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Easy,
    Intermediate,
    Hard,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Easy => write!(f, "easy"),
            Level::Intermediate => write!(f, "intermediate"),
            Level::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Level {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "easy" => Ok(Level::Easy),
            "2" | "intermediate" => Ok(Level::Intermediate),
            "3" | "hard" => Ok(Level::Hard),
            _ => Err(ServiceError::InvalidLevel(s.to_string())),
        }
    }
}

/// A multiple-choice question as stored in the question banks.
///
/// Every field is optional on input; generated questions are normalized
/// before they are saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// One answered quiz question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizAnswer {
    #[serde(default)]
    pub question: Option<String>,
    /// The correct option text.
    #[serde(default)]
    pub correct: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    /// What the learner typed (usually a 1-based option index).
    #[serde(default)]
    pub user_choice: String,
    /// The option text the choice resolved to, empty if invalid.
    #[serde(default)]
    pub user_answer: String,
}

impl QuizAnswer {
    pub fn is_correct(&self) -> bool {
        self.correct.as_deref() == Some(self.user_answer.as_str())
    }

    /// The answered question as a [`Question`] with the correct option as
    /// its answer, for use as an evaluator sample.
    pub fn to_question(&self) -> Question {
        Question {
            question: self.question.clone(),
            options: self.options.clone(),
            answer: self.correct.clone(),
            ..Default::default()
        }
    }
}

/// Correct answers and total questions of a quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizTally {
    pub correct: usize,
    pub total: usize,
}

impl QuizTally {
    /// Tally a set of answers. An empty attempt counts as 0 of 10.
    pub fn from_answers(answers: &[QuizAnswer]) -> Self {
        let total = if answers.is_empty() { 10 } else { answers.len() };
        let correct = answers.iter().filter(|a| a.is_correct()).count();
        Self { correct, total }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_display_and_parse() {
        assert_eq!(Level::Intermediate.to_string(), "intermediate");
        assert_eq!("1".parse::<Level>().unwrap(), Level::Easy);
        assert_eq!("HARD".parse::<Level>().unwrap(), Level::Hard);
        assert_eq!(" 2 ".parse::<Level>().unwrap(), Level::Intermediate);
        assert!(matches!(
            "4".parse::<Level>(),
            Err(ServiceError::InvalidLevel(_))
        ));
        assert!("expert".parse::<Level>().is_err());
    }

    #[test]
    fn score_set_uniform_is_complete() {
        let set = ScoreSet::uniform(3);
        assert!(set.is_complete());
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(Criterion::Depth), Some(3));
    }

    #[test]
    fn score_set_serializes_as_plain_object() {
        let mut set = ScoreSet::new();
        set.set(Criterion::Clarity, 4);
        set.insert("Extra", 2);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!({"Clarity": 4, "Extra": 2}));
    }

    #[test]
    fn plan_entry_defaults_missing_fields() {
        let entry: PlanEntry = serde_json::from_str(r#"{"plan": "intro"}"#).unwrap();
        assert_eq!(entry.score, 0.0);
        assert!(entry.scores.is_empty());
        assert_eq!(entry.iteration, 0);
        assert!(entry.last_optimization.is_none());
    }

    #[test]
    fn focus_areas_prefer_focus_next() {
        let result = OptimizeResult {
            focus_next: vec![" paging ".into(), "".into(), "locks".into()],
            improvements: vec![Improvement {
                text: "x".into(),
                area: Some("scheduling".into()),
                priority: None,
            }],
            ..Default::default()
        };
        assert_eq!(result.focus_areas(3), vec!["paging", "locks"]);
    }

    #[test]
    fn focus_areas_fall_back_to_improvement_areas() {
        let improvements = ["a", "b", "c", "d"]
            .iter()
            .map(|area| Improvement {
                text: String::new(),
                area: Some(area.to_string()),
                priority: None,
            })
            .collect();
        let result = OptimizeResult {
            improvements,
            ..Default::default()
        };
        assert_eq!(result.focus_areas(3), vec!["a", "b", "c"]);
    }

    #[test]
    fn replacement_plan_ignores_blank() {
        let mut result = OptimizeResult::unchanged("  ");
        assert!(result.replacement_plan().is_none());
        result.plan = "new plan".into();
        assert_eq!(result.replacement_plan(), Some("new plan"));
    }

    #[test]
    fn quiz_tally() {
        let answers = vec![
            QuizAnswer {
                correct: Some("A".into()),
                user_answer: "A".into(),
                ..Default::default()
            },
            QuizAnswer {
                correct: Some("B".into()),
                user_answer: "".into(),
                ..Default::default()
            },
        ];
        let tally = QuizTally::from_answers(&answers);
        assert_eq!(tally, QuizTally { correct: 1, total: 2 });
        assert!((tally.ratio() - 0.5).abs() < f64::EPSILON);

        let empty = QuizTally::from_answers(&[]);
        assert_eq!(empty.total, 10);
        assert_eq!(empty.ratio(), 0.0);
    }
}

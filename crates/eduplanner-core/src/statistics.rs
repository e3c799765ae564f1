//! CIDDP score aggregation and the quiz-based fallback estimate.

use crate::model::{QuizTally, ScoreSet};

/// Lowest and highest value on the rubric scale.
pub const SCALE_MIN: i64 = 1;
pub const SCALE_MAX: i64 = 5;

/// Mean of every value in the set; `0.0` for an empty set.
///
/// Unrecognized labels are included, matching what the model reported.
pub fn ciddp_score(scores: &ScoreSet) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f64 = scores.iter().map(|(_, v)| v as f64).sum();
    total / scores.len() as f64
}

/// Map a correctness ratio onto the rubric scale: `round(pct * 4) + 1`,
/// clamped to `[1, 5]`. Halves round to even.
pub fn estimate_from_ratio(pct: f64) -> i64 {
    let raw = (pct * 4.0).round_ties_even() as i64 + 1;
    raw.clamp(SCALE_MIN, SCALE_MAX)
}

/// A uniform score set estimated from quiz performance, plus the feedback
/// text that replaces the evaluator's.
pub fn estimate_scores(tally: QuizTally) -> (ScoreSet, String) {
    let value = estimate_from_ratio(tally.ratio());
    let feedback = format!(
        "Quiz performance: {}/{} correct",
        tally.correct, tally.total
    );
    (ScoreSet::uniform(value), feedback)
}

//! Decoders for free-form model output.
//!
//! The primary contract is a JSON object; the model is asked for one but
//! often wraps it in prose or falls back to the older bracketed-line rubric
//! format. Every decoder here degrades instead of failing: the caller gets
//! an empty or fallback value and decides what to do with it.

use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::model::{AnalystReport, Criterion, Improvement, OptimizeResult, ScoreSet};

/// Extract a CIDDP score set from raw evaluator output.
///
/// Tries, in order:
/// 1. the whole text as a JSON object with a `"scores"` object,
/// 2. the span between the first `{` and the last `}` as such an object,
/// 3. bracketed lines of the form `[TAG]:<int>; comment`.
///
/// Returns an empty set when nothing could be extracted.
pub fn parse_scores(text: &str) -> ScoreSet {
    if let Some(scores) = extract_json_object(text).and_then(|obj| scores_from_object(&obj)) {
        return scores;
    }
    parse_bracketed_scores(text)
}

fn scores_from_object(obj: &Map<String, Value>) -> Option<ScoreSet> {
    let scores = obj.get("scores")?.as_object()?;
    Some(
        scores
            .iter()
            .filter_map(|(label, value)| json_score(value).map(|v| (label.clone(), v)))
            .collect(),
    )
}

fn json_score(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        _ => None,
    }
}

/// Decode the legacy bracketed-line rubric format.
///
/// `C`, `I` and `D` map to Clarity, Integrity and Depth. The first `P` is
/// Practicality, the second Pertinence, later ones become `P_<n>`. `Pt` and
/// `pertinence` (any case) are Pertinence. Other tags are kept verbatim.
/// Lines that do not parse are skipped.
pub fn parse_bracketed_scores(text: &str) -> ScoreSet {
    let mut scores = ScoreSet::new();
    let mut p_count = 0u32;

    for line in text.lines() {
        let Some((tag, score)) = parse_bracketed_line(line) else {
            continue;
        };

        match tag {
            "C" => scores.set(Criterion::Clarity, score),
            "I" => scores.set(Criterion::Integrity, score),
            "D" => scores.set(Criterion::Depth, score),
            "P" => {
                p_count += 1;
                match p_count {
                    1 => scores.set(Criterion::Practicality, score),
                    2 => scores.set(Criterion::Pertinence, score),
                    n => scores.insert(format!("P_{n}"), score),
                }
            }
            t if t.eq_ignore_ascii_case("pt") || t.eq_ignore_ascii_case("pertinence") => {
                scores.set(Criterion::Pertinence, score)
            }
            other => scores.insert(other, score),
        }
    }

    scores
}

/// Split `[TAG]:<int>; comment` into its tag and score.
fn parse_bracketed_line(line: &str) -> Option<(&str, i64)> {
    let line = line.trim();
    let inner = line.strip_prefix('[')?;
    let end = inner.find(']')?;
    let tag = inner[..end].trim();
    let rest = inner[end + 1..].trim().strip_prefix(':')?;
    let score = rest.split(';').next()?.trim().parse::<i64>().ok()?;
    Some((tag, score))
}

/// Find a JSON object in model output: the whole text, or the span between
/// the first `{` and the last `}`.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(obj);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Decode optimizer output. `None` when no JSON object can be found.
///
/// Fields are read leniently: missing or mistyped fields take their
/// defaults, and improvements given as bare strings become `{text}`.
pub fn parse_optimize_result(text: &str) -> Option<OptimizeResult> {
    let obj = extract_json_object(text)?;

    let plan = obj
        .get("plan")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let improvements = obj
        .get("improvements")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(improvement_from_value).collect())
        .unwrap_or_default();

    let focus_next = obj
        .get("focus_next")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(value_to_text).collect())
        .unwrap_or_default();

    let exercise = obj
        .get("exercise")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let score = obj.get("score").and_then(Value::as_f64);

    Some(OptimizeResult {
        plan,
        improvements,
        focus_next,
        exercise,
        score,
    })
}

fn improvement_from_value(value: &Value) -> Option<Improvement> {
    match value {
        Value::String(text) => Some(Improvement {
            text: text.clone(),
            ..Default::default()
        }),
        Value::Object(obj) => Some(Improvement {
            text: obj.get("text").and_then(value_to_text).unwrap_or_default(),
            area: obj.get("area").and_then(value_to_text),
            priority: obj.get("priority").and_then(Value::as_i64),
        }),
        _ => None,
    }
}

/// Render a JSON scalar as text; `None` for null.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Decode analyst output into a misconception list.
///
/// Accepts a JSON object with a `misconceptions` key (whole text or braced
/// span). Anything else becomes a single misconception holding the raw text.
pub fn parse_analyst_report(text: &str) -> AnalystReport {
    let misconceptions = extract_json_object(text)
        .and_then(|obj| obj.get("misconceptions").cloned())
        .map(|value| match value {
            Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
            other => value_to_text(&other).into_iter().collect(),
        });

    AnalystReport {
        misconceptions: misconceptions.unwrap_or_else(|| vec![text.to_string()]),
        raw: text.to_string(),
    }
}

/// Extract the JSON array between the first `[` and the last `]`.
pub fn extract_json_array(text: &str) -> Result<Vec<Value>, ServiceError> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Err(ServiceError::MissingQuestionArray);
    };
    if end <= start {
        return Err(ServiceError::MissingQuestionArray);
    }
    serde_json::from_str::<Vec<Value>>(&text[start..=end])
        .map_err(|e| ServiceError::InvalidQuestionArray(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ciddp(c: i64, i: i64, d: i64, p: i64, pt: i64) -> ScoreSet {
        let mut set = ScoreSet::new();
        set.set(Criterion::Clarity, c);
        set.set(Criterion::Integrity, i);
        set.set(Criterion::Depth, d);
        set.set(Criterion::Practicality, p);
        set.set(Criterion::Pertinence, pt);
        set
    }

    #[test]
    fn json_scores_returned_as_is() {
        let text = r#"{"scores": {"Clarity": 4, "Integrity": 3, "Depth": 5, "Practicality": 2, "Pertinence": 1}, "summary": "ok"}"#;
        assert_eq!(parse_scores(text), ciddp(4, 3, 5, 2, 1));
    }

    #[test]
    fn json_scores_keep_unknown_labels() {
        let text = r#"{"scores": {"Clarity": 4, "Engagement": 2}}"#;
        let scores = parse_scores(text);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get_label("Engagement"), Some(2));
        assert!(!scores.is_complete());
    }

    #[test]
    fn json_embedded_in_prose() {
        let text = "Sure! Here is my evaluation:\n```json\n{\"scores\": {\"Clarity\": 2, \"Depth\": 3}}\n```\nHope it helps.";
        let scores = parse_scores(text);
        assert_eq!(scores.get(Criterion::Clarity), Some(2));
        assert_eq!(scores.get(Criterion::Depth), Some(3));
    }

    #[test]
    fn json_null_scores_are_dropped() {
        let text = r#"{"scores": {"Clarity": null, "Depth": 4.0}}"#;
        let scores = parse_scores(text);
        assert_eq!(scores.get(Criterion::Clarity), None);
        assert_eq!(scores.get(Criterion::Depth), Some(4));
    }

    #[test]
    fn bracketed_lines() {
        let text = "[C]:3; x\n[I]:4; y\n[D]:2; z\n[P]:5; a\n[P]:4; b";
        assert_eq!(parse_scores(text), ciddp(3, 4, 2, 5, 4));
    }

    #[test]
    fn third_p_gets_synthetic_key() {
        let text = "[P]:5; a\n[P]:4; b\n[P]:1; c";
        let scores = parse_scores(text);
        assert_eq!(scores.get(Criterion::Practicality), Some(5));
        assert_eq!(scores.get(Criterion::Pertinence), Some(4));
        assert_eq!(scores.get_label("P_3"), Some(1));
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn pt_tag_maps_to_pertinence() {
        let text = "[P]:5; practical\n[Pt]:2; off topic\n[PERTINENCE]:3; later";
        let scores = parse_scores(text);
        assert_eq!(scores.get(Criterion::Practicality), Some(5));
        assert_eq!(scores.get(Criterion::Pertinence), Some(3));
    }

    #[test]
    fn unknown_tags_kept_verbatim() {
        let scores = parse_scores("[Engagement]:4; lively");
        assert_eq!(scores.get_label("Engagement"), Some(4));
    }

    #[test]
    fn malformed_lines_skipped() {
        let text = "Evaluation:\n[C]:three; words\n[I] 4; no colon\nC]:2; no bracket\n[D]:2; fine\n\n  [P]: 5 ; spaced";
        let scores = parse_scores(text);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get(Criterion::Depth), Some(2));
        assert_eq!(scores.get(Criterion::Practicality), Some(5));
    }

    #[test]
    fn unparsable_p_line_does_not_advance_count() {
        let text = "[P]:n/a; skipped\n[P]:3; first real\n[P]:4; second real";
        let scores = parse_scores(text);
        assert_eq!(scores.get(Criterion::Practicality), Some(3));
        assert_eq!(scores.get(Criterion::Pertinence), Some(4));
    }

    #[test]
    fn nothing_matches_returns_empty() {
        assert!(parse_scores("I cannot evaluate this plan.").is_empty());
        assert!(parse_scores("").is_empty());
    }

    #[test]
    fn object_without_scores_falls_back_to_lines() {
        let text = "{\"summary\": \"meh\"}\n[C]:2; vague";
        let scores = parse_scores(text);
        assert_eq!(scores.get(Criterion::Clarity), Some(2));
    }

    #[test]
    fn optimizer_output_decoded() {
        let text = r#"Here you go:
{"plan": "1. Processes\n2. Paging",
 "improvements": [{"text": "Added paging", "area": "Memory", "priority": 2}, "Reordered topics"],
 "focus_next": ["TLB", "Deadlocks"],
 "exercise": {"title": "Page tables", "steps": ["draw"]}}"#;
        let result = parse_optimize_result(text).unwrap();
        assert_eq!(result.plan, "1. Processes\n2. Paging");
        assert_eq!(result.improvements.len(), 2);
        assert_eq!(result.improvements[0].area.as_deref(), Some("Memory"));
        assert_eq!(result.improvements[0].priority, Some(2));
        assert_eq!(result.improvements[1].text, "Reordered topics");
        assert_eq!(result.focus_next, vec!["TLB", "Deadlocks"]);
        assert_eq!(result.exercise["title"], "Page tables");
    }

    #[test]
    fn optimizer_output_without_object() {
        assert!(parse_optimize_result("no json here").is_none());
        assert!(parse_optimize_result("[1, 2, 3]").is_none());
    }

    #[test]
    fn analyst_json_object() {
        let text = r#"{"misconceptions": ["Threads share stacks", "Paging equals segmentation"]}"#;
        let report = parse_analyst_report(text);
        assert_eq!(report.misconceptions.len(), 2);
        assert_eq!(report.raw, text);
    }

    #[test]
    fn analyst_falls_back_to_raw_text() {
        let text = "Students often confuse processes and programs.";
        let report = parse_analyst_report(text);
        assert_eq!(report.misconceptions, vec![text.to_string()]);
    }

    #[test]
    fn analyst_object_without_key_falls_back() {
        let text = r#"{"issues": ["x"]}"#;
        let report = parse_analyst_report(text);
        assert_eq!(report.misconceptions, vec![text.to_string()]);
    }

    #[test]
    fn question_array_extracted() {
        let text = "Questions:\n[{\"id\": \"q1\", \"question\": \"What is a process?\"}]\nDone.";
        let items = extract_json_array(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "q1");
    }

    #[test]
    fn question_array_missing_or_malformed() {
        assert!(matches!(
            extract_json_array("no array"),
            Err(ServiceError::MissingQuestionArray)
        ));
        assert!(matches!(
            extract_json_array("] backwards ["),
            Err(ServiceError::MissingQuestionArray)
        ));
        assert!(matches!(
            extract_json_array("[{\"id\": }]"),
            Err(ServiceError::InvalidQuestionArray(_))
        ));
    }
}

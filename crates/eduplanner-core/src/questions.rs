//! Question banks: loading, sampling, quiz grading and storing generated
//! questions.
//!
//! Banks live in the data directory as `os_questions_<level>.json`, with
//! `os_questions.json` as the general bank used for evaluator samples.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::model::{Level, Question};
use crate::storage::{read_json, write_json};

/// Keys that may hold the question list when a bank is a JSON object.
const LIST_KEYS: [&str; 4] = ["questions", "items", "data", "questions_list"];

/// File-backed question banks under a data directory.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    data_dir: PathBuf,
}

impl QuestionBank {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The general bank, `os_questions.json`.
    pub fn general_path(&self) -> PathBuf {
        self.data_dir.join("os_questions.json")
    }

    pub fn level_path(&self, level: Level) -> PathBuf {
        self.data_dir.join(format!("os_questions_{level}.json"))
    }

    pub fn generated_path(&self, level: Level, user: &str) -> PathBuf {
        self.data_dir
            .join(format!("generated_questions_{level}_{user}.json"))
    }

    /// Up to `n` random questions from the level bank.
    pub fn sample_level(&self, level: Level, n: usize) -> Result<Vec<Question>> {
        let questions = load_questions(&self.level_path(level))?;
        Ok(sample(questions, n, &mut rand::thread_rng()))
    }

    /// Up to `n` random questions from the general bank; empty if there is
    /// no general bank.
    pub fn sample_general(&self, n: usize) -> Vec<Question> {
        match load_questions(&self.general_path()) {
            Ok(questions) => sample(questions, n, &mut rand::thread_rng()),
            Err(e) => {
                tracing::debug!("no sample questions: {e:#}");
                Vec::new()
            }
        }
    }

    /// Append questions to the level bank, skipping any without an id or
    /// text and any whose id or trimmed text is already present. Returns
    /// how many were appended.
    pub fn append_to_level(&self, level: Level, questions: &[Question]) -> Result<usize> {
        let path = self.level_path(level);
        let mut existing: Vec<Value> = read_json(&path).unwrap_or_default();

        let mut ids: HashSet<String> = HashSet::new();
        let mut texts: HashSet<String> = HashSet::new();
        for item in &existing {
            if let Some(id) = item.get("id").and_then(scalar_text).filter(|s| !s.is_empty()) {
                ids.insert(id);
            }
            if let Some(text) = item.get("question").and_then(scalar_text) {
                texts.insert(text.trim().to_string());
            }
        }

        let mut added = 0;
        for q in questions {
            let id = q.id.as_deref().unwrap_or_default();
            let text = q.question.as_deref().unwrap_or_default().trim();
            if id.is_empty() || text.is_empty() || ids.contains(id) || texts.contains(text) {
                continue;
            }
            ids.insert(id.to_string());
            texts.insert(text.to_string());
            existing.push(serde_json::to_value(q)?);
            added += 1;
        }

        if added > 0 {
            write_json(&path, &existing)?;
            tracing::info!(%level, added, "appended questions to level bank");
        }
        Ok(added)
    }

    /// Save generated questions for a user, replacing any earlier batch.
    pub fn save_generated(
        &self,
        level: Level,
        user: &str,
        questions: &[Question],
    ) -> Result<PathBuf> {
        let path = self.generated_path(level, user);
        write_json(&path, questions)?;
        Ok(path)
    }
}

/// Load a question bank. Accepts a JSON list of question objects or an
/// object holding the list under a well-known key (else its first list).
/// Non-object items are dropped.
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("questions file not found: {}", path.display()))?;
    let data: Value = serde_json::from_str(&content)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(questions_from_value(&data))
}

/// Extract question objects from a decoded bank.
pub fn questions_from_value(data: &Value) -> Vec<Question> {
    let items: &[Value] = match data {
        Value::Array(items) => items,
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .or_else(|| map.values().find_map(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(question_from_map)
        .collect()
}

/// All questions shuffled when `n >= len`, otherwise `n` drawn at random.
pub fn sample<R: Rng + ?Sized>(
    mut questions: Vec<Question>,
    n: usize,
    rng: &mut R,
) -> Vec<Question> {
    if n >= questions.len() {
        questions.shuffle(rng);
        questions
    } else {
        questions.choose_multiple(rng, n).cloned().collect()
    }
}

/// Normalize model-generated items into questions for `level`: non-objects
/// are dropped, a missing id becomes `gen-<level>-<8 hex>`, the level is
/// forced, and non-list options become `[answer]` (or nothing).
pub fn normalize_generated(items: &[Value], level: Level) -> Vec<Question> {
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|map| {
            let mut q = question_from_map(map);
            if q.id.as_deref().map_or(true, str::is_empty) {
                let hex = Uuid::new_v4().simple().to_string();
                q.id = Some(format!("gen-{level}-{}", &hex[..8]));
            }
            q.level = Some(level.to_string());
            if !map.get("options").is_some_and(Value::is_array) {
                q.options = q.answer.iter().filter(|a| !a.is_empty()).cloned().collect();
            }
            q
        })
        .collect()
}

fn question_from_map(map: &Map<String, Value>) -> Question {
    let text = |key: &str| map.get(key).and_then(scalar_text);
    Question {
        id: text("id"),
        topic: text("topic"),
        level: text("level"),
        question: text("question"),
        options: map
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| opts.iter().filter_map(scalar_text).collect())
            .unwrap_or_default(),
        answer: text("answer"),
        explanation: text("explanation"),
    }
}

/// Strings as-is, numbers and booleans rendered; null and containers are
/// treated as missing.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn q(id: &str, text: &str) -> Question {
        Question {
            id: Some(id.into()),
            question: Some(text.into()),
            options: vec!["a".into(), "b".into()],
            answer: Some("a".into()),
            ..Default::default()
        }
    }

    #[test]
    fn bank_shapes_are_accepted() {
        let list = json!([{"id": "1", "question": "x"}, "junk", {"id": 2}]);
        let parsed = questions_from_value(&list);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].id.as_deref(), Some("2"));

        let keyed = json!({"meta": 1, "items": [{"id": "a"}]});
        assert_eq!(questions_from_value(&keyed)[0].id.as_deref(), Some("a"));

        let first_list = json!({"meta": "x", "whatever": [{"id": "b"}]});
        assert_eq!(questions_from_value(&first_list)[0].id.as_deref(), Some("b"));

        assert!(questions_from_value(&json!({"meta": 1})).is_empty());
        assert!(questions_from_value(&json!(42)).is_empty());
    }

    #[test]
    fn missing_bank_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_questions(&dir.path().join("nope.json")).is_err());
        assert!(QuestionBank::new(dir.path()).sample_level(Level::Easy, 3).is_err());
        assert!(QuestionBank::new(dir.path()).sample_general(3).is_empty());
    }

    #[test]
    fn sample_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        let all: Vec<Question> = (0..5).map(|i| q(&i.to_string(), "t")).collect();

        let every = sample(all.clone(), 10, &mut rng);
        assert_eq!(every.len(), 5);
        let mut ids: Vec<_> = every.iter().filter_map(|q| q.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);

        assert_eq!(sample(all, 2, &mut rng).len(), 2);
    }

    #[test]
    fn append_dedups_by_id_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::new(dir.path());
        std::fs::write(
            bank.level_path(Level::Easy),
            json!([{"id": "q1", "question": "  What is a process? ", "extra": true}]).to_string(),
        )
        .unwrap();

        let incoming = vec![
            q("q1", "Different text"),
            q("q2", "What is a process?"),
            q("q3", "What is a thread?"),
            q("q3", "Another"),
            q("", "No id"),
            q("q4", "   "),
        ];
        assert_eq!(bank.append_to_level(Level::Easy, &incoming).unwrap(), 1);

        let saved: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(bank.level_path(Level::Easy)).unwrap())
                .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0]["extra"], json!(true));
        assert_eq!(saved[1]["id"], json!("q3"));

        assert_eq!(bank.append_to_level(Level::Easy, &incoming).unwrap(), 0);
    }

    #[test]
    fn append_creates_missing_bank() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::new(dir.path());
        assert_eq!(bank.append_to_level(Level::Hard, &[q("h1", "Q?")]).unwrap(), 1);
        assert_eq!(load_questions(&bank.level_path(Level::Hard)).unwrap().len(), 1);
    }

    #[test]
    fn normalize_fills_generated_fields() {
        let items = vec![
            json!({"question": "What is paging?", "options": "not a list", "answer": "Fixed blocks", "level": "easy"}),
            json!({"id": "keep", "question": "Q2", "options": ["x", "y"], "answer": "x"}),
            json!({"question": "Q3", "options": 5}),
            json!("dropped"),
        ];
        let out = normalize_generated(&items, Level::Hard);
        assert_eq!(out.len(), 3);

        let id = out[0].id.as_deref().unwrap();
        assert!(id.starts_with("gen-hard-"));
        assert_eq!(id.len(), "gen-hard-".len() + 8);
        assert_eq!(out[0].level.as_deref(), Some("hard"));
        assert_eq!(out[0].options, vec!["Fixed blocks"]);
        assert!(out[0].topic.is_none());

        assert_eq!(out[1].id.as_deref(), Some("keep"));
        assert_eq!(out[1].options, vec!["x", "y"]);
        assert!(out[2].options.is_empty());

        let value = serde_json::to_value(&out[2]).unwrap();
        assert_eq!(value["explanation"], Value::Null);
    }

    #[test]
    fn generated_file_is_per_user_and_level() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::new(dir.path());
        let path = bank
            .save_generated(Level::Intermediate, "alice", &[q("1", "t")])
            .unwrap();
        assert!(path.ends_with("generated_questions_intermediate_alice.json"));
        assert_eq!(load_questions(&path).unwrap().len(), 1);
    }
}

//! Per-user plan ledger.
//!
//! Each user has an append-only history file (`user_plans/<user>.json`, a
//! JSON array of [`PlanEntry`]) and a best file (`user_best/<user>.json`, a
//! single entry) that only moves on strict improvement. Files are rewritten
//! whole on every change; there is no locking, so only one process should
//! write a given data directory at a time.
//!
//! Entries are kept as raw JSON on disk and decoded one at a time when read.
//! An entry that does not match [`PlanEntry`] exactly (fractional criterion
//! scores, a null plan, a string score) is still read with defaults, and
//! appending never drops entries already in the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::ServiceError;
use crate::model::{OptimizeResult, PlanEntry, ScoreSet};
use crate::storage::{read_json, write_json};

const HISTORY_DIR: &str = "user_plans";
const BEST_DIR: &str = "user_best";

/// File-backed plan history and best-plan pointer.
#[derive(Debug, Clone)]
pub struct Ledger {
    root: PathBuf,
}

impl Ledger {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    fn history_path(&self, user: &str) -> Result<PathBuf, ServiceError> {
        validate_user_id(user)?;
        Ok(self.root.join(HISTORY_DIR).join(format!("{user}.json")))
    }

    fn best_path(&self, user: &str) -> Result<PathBuf, ServiceError> {
        validate_user_id(user)?;
        Ok(self.root.join(BEST_DIR).join(format!("{user}.json")))
    }

    /// Append an entry to the user's history. Existing entries are written
    /// back exactly as they were read.
    pub fn append(&self, user: &str, entry: &PlanEntry) -> Result<()> {
        let path = self.history_path(user)?;
        let mut entries = raw_history(&path);
        entries.push(serde_json::to_value(entry).context("failed to serialize plan entry")?);
        write_json(&path, &entries)?;
        tracing::debug!(user, count = entries.len(), "appended plan entry");
        Ok(())
    }

    /// The user's full history, oldest first. Empty if the file is missing,
    /// corrupt or not an array; array items that are not objects are skipped.
    pub fn history(&self, user: &str) -> Result<Vec<PlanEntry>> {
        let path = self.history_path(user)?;
        Ok(raw_history(&path).iter().filter_map(decode_entry).collect())
    }

    /// The highest-scoring entry in the user's history.
    pub fn best(&self, user: &str) -> Result<Option<PlanEntry>> {
        let history = self.history(user)?;
        Ok(best_entry(&history).cloned())
    }

    /// The entry stored in the user's best file, if any.
    pub fn persisted_best(&self, user: &str) -> Result<Option<PlanEntry>> {
        let path = self.best_path(user)?;
        Ok(read_json::<Value>(&path).as_ref().and_then(decode_entry))
    }

    /// Overwrite the best file if `entry` scores strictly higher than the
    /// current one (a missing or corrupt best file counts as 0). Returns
    /// whether the file was updated.
    pub fn update_best_if_higher(&self, user: &str, entry: &PlanEntry) -> Result<bool> {
        let path = self.best_path(user)?;
        let current = read_json::<Value>(&path)
            .as_ref()
            .and_then(decode_entry)
            .map_or(0.0, |e| e.score);
        if entry.score > current {
            write_json(&path, entry)?;
            tracing::info!(user, score = entry.score, previous = current, "new best plan");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn raw_history(path: &Path) -> Vec<Value> {
    match read_json::<Value>(path) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            tracing::warn!("{} is not a JSON array, starting a new history", path.display());
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// Decode one stored entry, falling back to field-by-field reading with
/// defaults when it does not match [`PlanEntry`]. `None` for non-objects.
fn decode_entry(value: &Value) -> Option<PlanEntry> {
    let obj = value.as_object()?;
    if let Ok(entry) = serde_json::from_value::<PlanEntry>(value.clone()) {
        return Some(entry);
    }

    let scores: ScoreSet = obj
        .get("scores")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(label, v)| {
                    lenient_number(v).map(|n| (label.clone(), n.round() as i64))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(PlanEntry {
        plan: obj
            .get("plan")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        score: obj.get("score").and_then(lenient_number).unwrap_or(0.0),
        scores,
        iteration: obj
            .get("iteration")
            .and_then(lenient_number)
            .map_or(0, |n| n.max(0.0) as u32),
        last_optimization: obj
            .get("last_optimization")
            .and_then(|v| serde_json::from_value::<OptimizeResult>(v.clone()).ok()),
    })
}

/// A finite number, or a string holding one.
fn lenient_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// The entry with the maximum score; the first one wins ties.
pub fn best_entry(entries: &[PlanEntry]) -> Option<&PlanEntry> {
    entries
        .iter()
        .reduce(|best, e| if e.score > best.score { e } else { best })
}

/// User ids become file names, so only a conservative character set is
/// accepted.
pub fn validate_user_id(user: &str) -> Result<(), ServiceError> {
    let valid = !user.is_empty()
        && user != "."
        && user != ".."
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidUserId(user.to_string()))
    }
}

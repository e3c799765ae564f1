//! Learner skill profile summarized into model prompts.

use std::collections::BTreeMap;

/// Topic dimensions tracked for an operating-systems learner, in display order.
pub const DIMENSIONS: [&str; 5] = [
    "Processes_and_Threads",
    "Memory_Management",
    "File_Systems",
    "Concurrency_Synchronization",
    "Security_Privileges",
];

/// Proficiency per dimension, 1 (beginner) to 5 (expert).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillProfile {
    levels: BTreeMap<&'static str, u8>,
}

impl Default for SkillProfile {
    fn default() -> Self {
        Self {
            levels: DIMENSIONS.iter().map(|d| (*d, 1)).collect(),
        }
    }
}

impl SkillProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a dimension's level. Unknown dimensions and levels outside 1..=5
    /// are ignored; returns whether the profile changed.
    pub fn set_level(&mut self, dimension: &str, level: u8) -> bool {
        if !(1..=5).contains(&level) {
            return false;
        }
        match DIMENSIONS.iter().find(|d| **d == dimension) {
            Some(dim) => {
                self.levels.insert(*dim, level);
                true
            }
            None => false,
        }
    }

    pub fn level(&self, dimension: &str) -> Option<u8> {
        self.levels.get(dimension).copied()
    }

    /// `"<dimension>: Level <n>"` for each dimension, joined with `"; "`.
    pub fn summary(&self) -> String {
        DIMENSIONS
            .iter()
            .map(|d| format!("{d}: Level {}", self.levels.get(d).copied().unwrap_or(1)))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Parse `Dimension=level` pairs, e.g. from the command line.
    pub fn from_assignments<'a>(pairs: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let mut profile = Self::new();
        for pair in pairs {
            let (dim, level) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected Dimension=level, got '{pair}'"))?;
            let level: u8 = level
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid skill level in '{pair}'"))?;
            anyhow::ensure!(
                profile.set_level(dim.trim(), level),
                "unknown dimension or level out of range: '{pair}' (dimensions: {})",
                DIMENSIONS.join(", ")
            );
        }
        Ok(profile)
    }
}

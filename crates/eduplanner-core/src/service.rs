//! The planner service: the operations exposed to the CLI.
//!
//! Wires the LLM agents, ledger and question banks together. Validation
//! failures surface as [`ServiceError`](crate::error::ServiceError);
//! everything else is an `anyhow::Error` with context.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agents::{LlmAnalyst, LlmEvaluator, LlmOptimizer, ModelClient};
use crate::cache::{TtlCache, DEFAULT_CAPACITY};
use crate::engine::{IterationEngine, SessionConfig, SessionInput, SessionObserver};
use crate::error::ServiceError;
use crate::ledger::{validate_user_id, Ledger};
use crate::model::{Level, OptimizeResult, PlanEntry, Question, QuizAnswer, ScoreSet};
use crate::parser::extract_json_array;
use crate::prompts::question_generation_prompt;
use crate::questions::{normalize_generated, QuestionBank};
use crate::report::SessionReport;
use crate::skill::SkillProfile;
use crate::statistics::ciddp_score;
use crate::traits::{Analyst, Evaluator, LlmProvider, Optimizer};

/// Evaluator samples drawn from the general bank when none are given.
const DEFAULT_SAMPLE_COUNT: usize = 10;

const GENERATION_TEMPERATURE: f64 = 0.7;

/// Outline used when a user has no saved plan and no `lessonplan.txt` exists.
pub const DEFAULT_PLAN: &str = "\
Operating Systems Lesson Plan:
1. Introduction to Operating Systems
2. Processes and Threads
3. Memory Management
4. File Systems
5. Device Management
6. Scheduling and Multitasking
7. Deadlocks and Synchronization
8. Security and Protection
9. Virtual Memory
10. OS Architectures (Monolithic, Microkernel)
";

/// Storage locations and tuning for a [`PlannerService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub session: SessionConfig,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_dir: PathBuf::from("./cache"),
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: DEFAULT_CAPACITY,
            session: SessionConfig::default(),
        }
    }
}

/// Scores and feedback from a single evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub scores: ScoreSet,
    pub feedback: String,
}

/// Where a batch of generated questions went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestions {
    /// File name of the saved batch, relative to the data directory.
    pub filename: String,
    pub count: usize,
    /// How many were new to the level bank.
    pub appended: usize,
}

/// Facade over the planning loop and its persistent state.
pub struct PlannerService {
    evaluator: Arc<dyn Evaluator>,
    optimizer: Arc<dyn Optimizer>,
    analyst: Arc<dyn Analyst>,
    client: ModelClient,
    ledger: Ledger,
    bank: QuestionBank,
    skill: SkillProfile,
    settings: ServiceSettings,
}

impl PlannerService {
    /// A service whose agents all call `model` on `provider`. The optimizer
    /// and analyst caches are stored in the cache directory.
    pub fn new(provider: Arc<dyn LlmProvider>, model: &str, settings: ServiceSettings) -> Self {
        let client = ModelClient::new(provider, model);
        let cache = |name: &str| {
            TtlCache::open(
                settings.cache_dir.join(format!("{name}_cache.json")),
                settings.cache_ttl,
                settings.cache_capacity,
            )
        };
        let evaluator = Arc::new(LlmEvaluator::new(client.clone()));
        let optimizer = Arc::new(LlmOptimizer::new(
            client.clone(),
            cache("optimizer"),
            settings.cache_ttl,
        ));
        let analyst = Arc::new(LlmAnalyst::new(
            client.clone(),
            cache("analyst"),
            settings.cache_ttl,
        ));
        Self::with_agents(evaluator, optimizer, analyst, client, settings)
    }

    /// A service with explicit collaborators; `client` is still used for
    /// question generation.
    pub fn with_agents(
        evaluator: Arc<dyn Evaluator>,
        optimizer: Arc<dyn Optimizer>,
        analyst: Arc<dyn Analyst>,
        client: ModelClient,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            evaluator,
            optimizer,
            analyst,
            client,
            ledger: Ledger::new(&settings.data_dir),
            bank: QuestionBank::new(&settings.data_dir),
            skill: SkillProfile::default(),
            settings,
        }
    }

    /// Skill profile passed to the agents by `evaluate` and `optimize`.
    pub fn with_skill(mut self, skill: SkillProfile) -> Self {
        self.skill = skill;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn question_bank(&self) -> &QuestionBank {
        &self.bank
    }

    /// Evaluate a plan and record it in the user's history with the next
    /// iteration number. Without explicit samples, up to ten questions from
    /// the general bank are used.
    pub async fn evaluate(
        &self,
        user: &str,
        plan: &str,
        sample_questions: Option<Vec<Question>>,
    ) -> Result<Evaluation> {
        validate_user_id(user)?;
        let samples = match sample_questions {
            Some(samples) => samples,
            None => self.bank.sample_general(DEFAULT_SAMPLE_COUNT),
        };

        let (scores, feedback) = self.evaluator.evaluate(plan, &self.skill, &samples).await?;
        let iteration = self.ledger.history(user)?.len() as u32 + 1;
        self.ledger
            .append(user, &PlanEntry::new(plan, scores.clone(), iteration))?;
        tracing::info!(user, iteration, score = ciddp_score(&scores), "plan evaluated");
        Ok(Evaluation { scores, feedback })
    }

    /// Optimize a plan and record the candidate in the user's history. The
    /// candidate carries the optimizer's own score (0 if none) and the
    /// scores the caller supplied.
    pub async fn optimize(
        &self,
        user: &str,
        plan: &str,
        feedback: &str,
        scores: Option<ScoreSet>,
    ) -> Result<OptimizeResult> {
        validate_user_id(user)?;
        let result = self.optimizer.optimize(plan, feedback, &self.skill).await?;
        let entry = PlanEntry {
            plan: result.replacement_plan().unwrap_or(plan).to_string(),
            score: result.score.unwrap_or(0.0),
            scores: scores.unwrap_or_default(),
            iteration: self.ledger.history(user)?.len() as u32 + 1,
            last_optimization: Some(result.clone()),
        };
        self.ledger.append(user, &entry)?;
        Ok(result)
    }

    pub fn get_best_plan(&self, user: &str) -> Result<Option<PlanEntry>> {
        self.ledger.best(user)
    }

    pub fn get_history(&self, user: &str) -> Result<Vec<PlanEntry>> {
        self.ledger.history(user)
    }

    /// Ask the model for `n` questions about the user's best plan, save the
    /// batch and add new ones to the level bank.
    pub async fn generate_questions_for_user(
        &self,
        user: &str,
        level: Level,
        n: usize,
    ) -> Result<GeneratedQuestions> {
        validate_user_id(user)?;
        if n == 0 {
            return Err(ServiceError::InvalidQuestionCount.into());
        }
        let plan = self
            .ledger
            .best(user)?
            .map(|e| e.plan)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| user.to_string());

        let prompt = question_generation_prompt(&plan, level, n);
        let raw = self.client.complete(prompt, GENERATION_TEMPERATURE).await?;
        let items = extract_json_array(&raw)?;
        let questions = normalize_generated(&items, level);

        let path = self.bank.save_generated(level, user, &questions)?;
        let appended = match self.bank.append_to_level(level, &questions) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(%level, "failed to append to level bank: {e:#}");
                0
            }
        };

        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(user, %level, count = questions.len(), appended, "generated questions");
        Ok(GeneratedQuestions {
            filename,
            count: questions.len(),
            appended,
        })
    }

    /// Up to `n` random questions from the level bank.
    pub fn questions(&self, level: Level, n: usize) -> Result<Vec<Question>> {
        self.bank.sample_level(level, n)
    }

    /// Run the full iteration loop for a user.
    pub async fn run_session(
        &self,
        user: &str,
        initial_plan: &str,
        skill: SkillProfile,
        answers: Vec<QuizAnswer>,
        observer: &dyn SessionObserver,
    ) -> Result<SessionReport> {
        let engine = IterationEngine::new(
            Arc::clone(&self.evaluator),
            Arc::clone(&self.optimizer),
            Arc::clone(&self.analyst),
            self.ledger.clone(),
            self.settings.session.clone(),
        );
        let input = SessionInput {
            user: user.to_string(),
            initial_plan: initial_plan.to_string(),
            skill,
            answers,
        };
        engine.run(&input, observer).await
    }

    /// The plan a new session starts from: the user's saved best plan, else
    /// `lessonplan.txt` in the data directory, else [`DEFAULT_PLAN`].
    pub fn initial_plan(&self, user: &str) -> Result<String> {
        if let Some(best) = self.ledger.persisted_best(user)? {
            if !best.plan.trim().is_empty() {
                tracing::info!(user, "resuming from saved best plan");
                return Ok(best.plan);
            }
        }

        let path = self.settings.data_dir.join("lessonplan.txt");
        if path.exists() {
            return std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
        Ok(DEFAULT_PLAN.to_string())
    }
}

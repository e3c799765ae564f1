//! The planning iteration loop.
//!
//! Each round evaluates the working plan, falls back to a quiz-based
//! estimate when no scores come back, records the result in the ledger,
//! asks the optimizer for a revision and the analyst for misconceptions.
//! Rounds always run to completion; only a connectivity failure during
//! evaluation short-circuits a single round.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use uuid::Uuid;

use crate::error::is_connectivity_error;
use crate::ledger::Ledger;
use crate::model::{OptimizeResult, PlanEntry, Question, QuizAnswer, QuizTally, ScoreSet};
use crate::report::{RoundRecord, SessionReport};
use crate::skill::SkillProfile;
use crate::statistics::{ciddp_score, estimate_scores};
use crate::traits::{Analyst, Evaluator, Optimizer};

/// Configuration for a planning session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of rounds to run.
    pub rounds: u32,
    /// Pause after every optimize step.
    pub optimize_pause: Duration,
    /// Maximum focus areas passed to the analyst.
    pub max_focus_areas: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            optimize_pause: Duration::from_secs(1),
            max_focus_areas: 3,
        }
    }
}

/// Everything a session needs from the learner.
#[derive(Debug, Clone, Default)]
pub struct SessionInput {
    pub user: String,
    pub initial_plan: String,
    pub skill: SkillProfile,
    pub answers: Vec<QuizAnswer>,
}

/// Progress reporting trait.
pub trait SessionObserver: Send + Sync {
    fn on_round_start(&self, round: u32, total: u32);
    fn on_round_complete(&self, record: &RoundRecord);
    fn on_session_complete(&self, report: &SessionReport);
}

/// No-op observer.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_round_start(&self, _: u32, _: u32) {}
    fn on_round_complete(&self, _: &RoundRecord) {}
    fn on_session_complete(&self, _: &SessionReport) {}
}

/// Drives evaluator, optimizer and analyst through a fixed number of rounds.
pub struct IterationEngine {
    evaluator: Arc<dyn Evaluator>,
    optimizer: Arc<dyn Optimizer>,
    analyst: Arc<dyn Analyst>,
    ledger: Ledger,
    config: SessionConfig,
}

impl IterationEngine {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        optimizer: Arc<dyn Optimizer>,
        analyst: Arc<dyn Analyst>,
        ledger: Ledger,
        config: SessionConfig,
    ) -> Self {
        Self {
            evaluator,
            optimizer,
            analyst,
            ledger,
            config,
        }
    }

    /// Run a full session. Collaborator and ledger failures are logged and
    /// absorbed; only an invalid user id fails the session.
    pub async fn run(
        &self,
        input: &SessionInput,
        observer: &dyn SessionObserver,
    ) -> Result<SessionReport> {
        crate::ledger::validate_user_id(&input.user)?;

        let start = Instant::now();
        let samples: Vec<Question> = input.answers.iter().map(QuizAnswer::to_question).collect();
        let tally = QuizTally::from_answers(&input.answers);

        let mut plan = input.initial_plan.clone();
        let mut rounds = Vec::with_capacity(self.config.rounds as usize);
        let mut pitfalls: Vec<Vec<String>> = Vec::new();
        let mut seen_pitfalls = HashSet::new();

        for round in 1..=self.config.rounds {
            observer.on_round_start(round, self.config.rounds);

            let evaluation = self.evaluator.evaluate(&plan, &input.skill, &samples).await;
            let (scores, feedback) = match evaluation {
                Ok(result) => result,
                Err(e) if is_connectivity_error(&e) => {
                    tracing::warn!(round, "evaluator unreachable, skipping round: {e:#}");
                    let record = RoundRecord::offline(round, &plan);
                    observer.on_round_complete(&record);
                    rounds.push(record);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(round, "evaluation failed: {e:#}");
                    (ScoreSet::new(), String::new())
                }
            };

            let (scores, feedback, estimated) = if scores.is_empty() {
                tracing::info!(
                    round,
                    correct = tally.correct,
                    total = tally.total,
                    "estimating scores from quiz performance"
                );
                let (scores, feedback) = estimate_scores(tally);
                (scores, feedback, true)
            } else {
                (scores, feedback, false)
            };

            let score = ciddp_score(&scores);
            tracing::info!(round, "CIDDP score {score:.2}");
            self.persist(&input.user, PlanEntry::new(plan.clone(), scores.clone(), round));

            let optimization = match self.optimizer.optimize(&plan, &feedback, &input.skill).await {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(round, "optimization failed, keeping plan: {e:#}");
                    None
                }
            };
            let evaluated_plan = std::mem::take(&mut plan);
            plan = optimization
                .as_ref()
                .and_then(OptimizeResult::replacement_plan)
                .map(str::to_string)
                .unwrap_or_else(|| evaluated_plan.clone());
            if !self.config.optimize_pause.is_zero() {
                tokio::time::sleep(self.config.optimize_pause).await;
            }

            let focus_areas = optimization
                .as_ref()
                .map(|o| o.focus_areas(self.config.max_focus_areas))
                .unwrap_or_default();
            let misconceptions = match self
                .analyst
                .analyze_errors(&plan, &input.skill, &focus_areas)
                .await
            {
                Ok(report) => report.misconceptions,
                Err(e) => {
                    tracing::warn!(round, "analysis failed: {e:#}");
                    Vec::new()
                }
            };
            if !misconceptions.is_empty() {
                let fingerprint = serde_json::to_string(&misconceptions)?;
                if seen_pitfalls.insert(fingerprint) {
                    pitfalls.push(misconceptions.clone());
                }
            }

            let record = RoundRecord {
                round,
                plan: evaluated_plan,
                score,
                scores,
                feedback,
                estimated,
                offline: false,
                optimization,
                misconceptions,
            };
            observer.on_round_complete(&record);
            rounds.push(record);
        }

        let report = SessionReport {
            id: Uuid::new_v4(),
            user: input.user.clone(),
            created_at: chrono::Utc::now(),
            rounds,
            pitfalls,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        if let Some(best) = report.best_round() {
            tracing::info!(
                user = %report.user,
                round = best.round,
                "session complete, best score {:.2}",
                best.score
            );
        }
        observer.on_session_complete(&report);
        Ok(report)
    }

    fn persist(&self, user: &str, entry: PlanEntry) {
        if let Err(e) = self.ledger.append(user, &entry) {
            tracing::warn!(user, "failed to record plan history: {e:#}");
        }
        if let Err(e) = self.ledger.update_best_if_higher(user, &entry) {
            tracing::warn!(user, "failed to update best plan: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::{AnalystReport, Criterion, Improvement};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Evaluator replaying scripted outcomes, then repeating the last one.
    struct ScriptedEvaluator {
        script: Mutex<VecDeque<Result<ScoreSet>>>,
        seen_plans: Mutex<Vec<String>>,
    }

    impl ScriptedEvaluator {
        fn new(script: Vec<Result<ScoreSet>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen_plans: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        async fn evaluate(
            &self,
            plan: &str,
            _: &SkillProfile,
            _: &[Question],
        ) -> Result<(ScoreSet, String)> {
            self.seen_plans.lock().unwrap().push(plan.to_string());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(scores)) => Ok((scores, "scripted feedback".into())),
                Some(Err(e)) => Err(e),
                None => Ok((ScoreSet::uniform(3), "default".into())),
            }
        }
    }

    /// Appends " v<n>" to the plan and reports fixed focus areas.
    struct SuffixOptimizer {
        calls: Mutex<u32>,
        fail: bool,
    }

    #[async_trait]
    impl Optimizer for SuffixOptimizer {
        async fn optimize(&self, plan: &str, _: &str, _: &SkillProfile) -> Result<OptimizeResult> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail {
                anyhow::bail!("optimizer exploded");
            }
            Ok(OptimizeResult {
                plan: format!("{plan} v{calls}"),
                improvements: vec![Improvement {
                    text: "more examples".into(),
                    area: Some("Paging".into()),
                    priority: Some(2),
                }],
                focus_next: vec![
                    " TLB ".into(),
                    "".into(),
                    "Locks".into(),
                    "IPC".into(),
                    "Disk".into(),
                ],
                ..Default::default()
            })
        }
    }

    /// Always reports the same misconceptions and records focus areas.
    struct FixedAnalyst {
        focus_seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Analyst for FixedAnalyst {
        async fn analyze_errors(
            &self,
            _: &str,
            _: &SkillProfile,
            focus_areas: &[String],
        ) -> Result<AnalystReport> {
            self.focus_seen.lock().unwrap().push(focus_areas.to_vec());
            Ok(AnalystReport {
                misconceptions: vec!["paging is segmentation".into()],
                raw: String::new(),
            })
        }
    }

    struct Fixture {
        evaluator: Arc<ScriptedEvaluator>,
        optimizer: Arc<SuffixOptimizer>,
        analyst: Arc<FixedAnalyst>,
        engine: IterationEngine,
        ledger: Ledger,
        _dir: tempfile::TempDir,
    }

    fn fixture(script: Vec<Result<ScoreSet>>, optimizer_fails: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        let evaluator = ScriptedEvaluator::new(script);
        let optimizer = Arc::new(SuffixOptimizer {
            calls: Mutex::new(0),
            fail: optimizer_fails,
        });
        let analyst = Arc::new(FixedAnalyst {
            focus_seen: Mutex::new(Vec::new()),
        });
        let engine = IterationEngine::new(
            evaluator.clone(),
            optimizer.clone(),
            analyst.clone(),
            ledger.clone(),
            SessionConfig::default(),
        );
        Fixture {
            evaluator,
            optimizer,
            analyst,
            engine,
            ledger,
            _dir: dir,
        }
    }

    fn input(answers: Vec<QuizAnswer>) -> SessionInput {
        SessionInput {
            user: "alice".into(),
            initial_plan: "plan".into(),
            skill: SkillProfile::new(),
            answers,
        }
    }

    fn answer(correct: bool) -> QuizAnswer {
        QuizAnswer {
            correct: Some("A".into()),
            options: vec!["A".into(), "B".into()],
            user_choice: "1".into(),
            user_answer: if correct { "A".into() } else { "B".into() },
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_all_rounds_and_persists_each() {
        let f = fixture(
            vec![
                Ok(ScoreSet::uniform(2)),
                Ok(ScoreSet::uniform(4)),
                Ok(ScoreSet::uniform(4)),
            ],
            false,
        );
        let report = f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();

        assert_eq!(report.rounds.len(), 3);
        assert_eq!(
            *f.evaluator.seen_plans.lock().unwrap(),
            vec!["plan", "plan v1", "plan v1 v2"]
        );
        let best = report.best_round().unwrap();
        assert_eq!(best.round, 2);
        assert_eq!(best.plan, "plan v1");

        let history = f.ledger.history("alice").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.iter().map(|e| e.iteration).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(f.ledger.persisted_best("alice").unwrap().unwrap().plan, "plan v1");
        assert_eq!(report.final_plan(), Some("plan v1 v2 v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_failure_yields_zero_round() {
        let f = fixture(
            vec![
                Err(ProviderError::NetworkError("connection refused".into()).into()),
                Ok(ScoreSet::uniform(5)),
            ],
            false,
        );
        let report = f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();

        assert_eq!(report.rounds.len(), 3);
        let first = &report.rounds[0];
        assert!(first.offline);
        assert_eq!(first.score, 0.0);
        assert!(first.scores.is_empty());
        assert_eq!(first.plan, "plan");

        assert_eq!(*f.optimizer.calls.lock().unwrap(), 2);
        assert_eq!(f.ledger.history("alice").unwrap().len(), 2, "offline rounds are not persisted");
        assert_eq!(report.best_round().unwrap().round, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_scores_fall_back_to_quiz_estimate() {
        let f = fixture(vec![Ok(ScoreSet::new())], false);
        let answers = vec![answer(true), answer(true), answer(false), answer(false)];
        let report = f.engine.run(&input(answers), &NoopObserver).await.unwrap();

        let first = &report.rounds[0];
        assert!(first.estimated);
        assert_eq!(first.scores, ScoreSet::uniform(3));
        assert_eq!(first.score, 3.0);
        assert_eq!(first.feedback, "Quiz performance: 2/4 correct");
        assert!(!report.rounds[1].estimated);
    }

    #[tokio::test(start_paused = true)]
    async fn other_evaluator_errors_estimate_with_default_total() {
        let f = fixture(vec![Err(anyhow::anyhow!("bad gateway"))], false);
        let report = f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();

        let first = &report.rounds[0];
        assert!(!first.offline);
        assert_eq!(first.scores.get(Criterion::Depth), Some(1));
        assert_eq!(first.feedback, "Quiz performance: 0/10 correct");
        assert_eq!(f.ledger.history("alice").unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn optimizer_failure_keeps_plan() {
        let f = fixture(vec![], true);
        let report = f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();

        assert_eq!(*f.evaluator.seen_plans.lock().unwrap(), vec!["plan"; 3]);
        assert!(report.rounds.iter().all(|r| r.optimization.is_none()));
        assert!(f.analyst.focus_seen.lock().unwrap().iter().all(Vec::is_empty));
    }

    #[tokio::test(start_paused = true)]
    async fn focus_areas_are_trimmed_and_capped() {
        let f = fixture(vec![], false);
        f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();
        let seen = f.analyst.focus_seen.lock().unwrap();
        assert_eq!(seen[0], vec!["TLB", "Locks", "IPC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pitfalls_are_deduplicated() {
        let f = fixture(vec![], false);
        let report = f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();
        assert_eq!(report.pitfalls, vec![vec!["paging is segmentation".to_string()]]);
        assert!(report.rounds.iter().all(|r| r.misconceptions.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_follows_each_optimize_step() {
        let f = fixture(vec![], false);
        let before = tokio::time::Instant::now();
        f.engine.run(&input(vec![]), &NoopObserver).await.unwrap();
        assert!(before.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn invalid_user_is_rejected() {
        let f = fixture(vec![], false);
        let mut bad = input(vec![]);
        bad.user = "../etc".into();
        assert!(f.engine.run(&bad, &NoopObserver).await.is_err());
        assert!(f.evaluator.seen_plans.lock().unwrap().is_empty());
    }
}

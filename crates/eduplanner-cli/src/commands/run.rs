//! The `eduplanner run` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use eduplanner_core::engine::SessionObserver;
use eduplanner_core::model::QuizAnswer;
use eduplanner_core::report::{plan_outline, RoundRecord, SessionReport};
use eduplanner_core::skill::SkillProfile;

use super::{planner, read_json, read_plan};

/// Console progress observer.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_round_start(&self, round: u32, total: u32) {
        eprintln!("Round {round}/{total}: evaluating...");
    }

    fn on_round_complete(&self, record: &RoundRecord) {
        if record.offline {
            eprintln!("  Round {}: model unreachable, scored 0", record.round);
            return;
        }
        let source = if record.estimated {
            " (estimated from quiz)"
        } else {
            ""
        };
        eprintln!(
            "  Round {}: CIDDP {:.2}{source}, {} misconceptions",
            record.round,
            record.score,
            record.misconceptions.len()
        );
    }

    fn on_session_complete(&self, report: &SessionReport) {
        eprintln!(
            "\nComplete: {} rounds ({:.1}s)",
            report.rounds.len(),
            report.duration_ms as f64 / 1000.0
        );
    }
}

pub async fn execute(
    user: String,
    plan_file: Option<PathBuf>,
    answers: Option<PathBuf>,
    skills: Vec<String>,
    report_path: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let skill = SkillProfile::from_assignments(skills.iter().map(String::as_str))?;
    let answers: Vec<QuizAnswer> = match &answers {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let service = planner(config)?;
    let initial_plan = match &plan_file {
        Some(path) => read_plan(path)?,
        None => service.initial_plan(&user)?,
    };

    eprintln!(
        "eduplanner v{} | user {user} | {} quiz answers",
        env!("CARGO_PKG_VERSION"),
        answers.len()
    );
    let report = service
        .run_session(&user, &initial_plan, skill, answers, &ConsoleObserver)
        .await?;

    print_summary(&report);

    if let Some(best) = report.best_round() {
        println!("\nBest plan (round {}, CIDDP {:.2}):", best.round, best.score);
        for line in plan_outline(&best.plan) {
            println!("{line}");
        }
    }

    if !report.pitfalls.is_empty() {
        println!("\nCommon pitfalls:");
        for item in report.pitfalls.iter().flatten() {
            println!("  - {item}");
        }
    }

    if let Some(path) = report_path {
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &SessionReport) {
    let mut table = Table::new();
    table.set_header(vec!["Round", "CIDDP", "Source", "Misconceptions"]);

    for record in &report.rounds {
        let source = if record.offline {
            "offline"
        } else if record.estimated {
            "quiz estimate"
        } else {
            "evaluator"
        };
        table.add_row(vec![
            Cell::new(record.round),
            Cell::new(format!("{:.2}", record.score)),
            Cell::new(source),
            Cell::new(record.misconceptions.len()),
        ]);
    }

    println!("{table}");
}

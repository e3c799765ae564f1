//! The `eduplanner history` and `eduplanner best` commands.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use eduplanner_core::model::{Criterion, ScoreSet};
use eduplanner_core::report::plan_outline;

use super::planner;

pub fn execute(user: String, config: Option<PathBuf>) -> Result<()> {
    let service = planner(config)?;
    let history = service.get_history(&user)?;

    if history.is_empty() {
        println!("No plans recorded for {user}.");
        return Ok(());
    }

    let mut table = Table::new();
    let mut header = vec!["Iteration".to_string(), "Score".to_string()];
    header.extend(Criterion::ALL.iter().map(|c| c.to_string()));
    header.push("Optimized".to_string());
    table.set_header(header);

    for entry in &history {
        let mut row = vec![
            Cell::new(entry.iteration),
            Cell::new(format!("{:.2}", entry.score)),
        ];
        row.extend(Criterion::ALL.iter().map(|c| {
            Cell::new(
                entry
                    .scores
                    .get(*c)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".into()),
            )
        }));
        row.push(Cell::new(if entry.last_optimization.is_some() {
            "yes"
        } else {
            ""
        }));
        table.add_row(row);
    }

    println!("{table}");
    Ok(())
}

pub fn best(user: String, config: Option<PathBuf>) -> Result<()> {
    let service = planner(config)?;
    let Some(entry) = service.get_best_plan(&user)? else {
        println!("No plans recorded for {user}.");
        return Ok(());
    };

    println!(
        "Best plan for {user} (iteration {}, score {:.2}):",
        entry.iteration, entry.score
    );
    for line in plan_outline(&entry.plan) {
        println!("{line}");
    }
    if !entry.scores.is_empty() {
        println!();
        print_scores(&entry.scores);
    }
    Ok(())
}

/// Criterion/score table, including any labels the parser kept verbatim.
pub(crate) fn print_scores(scores: &ScoreSet) {
    let mut table = Table::new();
    table.set_header(vec!["Criterion", "Score"]);
    for (label, value) in scores.iter() {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    println!("{table}");
}

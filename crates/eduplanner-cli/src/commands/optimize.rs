//! The `eduplanner optimize` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use eduplanner_core::model::ScoreSet;
use eduplanner_core::skill::SkillProfile;

use super::{planner, read_plan};

pub async fn execute(
    user: String,
    plan_file: PathBuf,
    feedback: String,
    scores: Option<String>,
    skills: Vec<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let plan = read_plan(&plan_file)?;
    let scores = scores
        .map(|s| serde_json::from_str::<ScoreSet>(&s).context("--scores must be a JSON object"))
        .transpose()?;
    let skill = SkillProfile::from_assignments(skills.iter().map(String::as_str))?;

    let service = planner(config)?.with_skill(skill);
    let result = service.optimize(&user, &plan, &feedback, scores).await?;

    match result.replacement_plan() {
        Some(new_plan) => println!("{}", new_plan.trim()),
        None => println!("The optimizer returned no new plan; keeping the current one."),
    }

    if !result.improvements.is_empty() {
        println!("\nImprovements:");
        for improvement in &result.improvements {
            match &improvement.area {
                Some(area) => println!("  - [{area}] {}", improvement.text),
                None => println!("  - {}", improvement.text),
            }
        }
    }
    let focus = result.focus_areas(3);
    if !focus.is_empty() {
        println!("\nFocus next: {}", focus.join(", "));
    }
    Ok(())
}

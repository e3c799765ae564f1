//! The `eduplanner evaluate` command.

use std::path::PathBuf;

use anyhow::Result;

use eduplanner_core::model::Question;
use eduplanner_core::skill::SkillProfile;
use eduplanner_core::statistics::ciddp_score;

use super::{planner, read_json, read_plan};

pub async fn execute(
    user: String,
    plan_file: PathBuf,
    questions: Option<PathBuf>,
    skills: Vec<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let plan = read_plan(&plan_file)?;
    let samples = questions
        .map(|path| read_json::<Vec<Question>>(&path))
        .transpose()?;
    let skill = SkillProfile::from_assignments(skills.iter().map(String::as_str))?;

    let service = planner(config)?.with_skill(skill);
    let evaluation = service.evaluate(&user, &plan, samples).await?;

    if evaluation.scores.is_empty() {
        println!("No scores could be read from the evaluator's reply.");
    } else {
        super::history::print_scores(&evaluation.scores);
    }
    println!("CIDDP score: {:.2}", ciddp_score(&evaluation.scores));
    if !evaluation.feedback.trim().is_empty() {
        println!("\nFeedback:\n{}", evaluation.feedback.trim());
    }
    Ok(())
}

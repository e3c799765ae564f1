//! The `eduplanner questions` and `eduplanner generate-questions` commands.

use std::path::PathBuf;

use anyhow::Result;

use eduplanner_core::model::Level;

use super::planner;

pub async fn generate(
    user: String,
    level: String,
    count: usize,
    config: Option<PathBuf>,
) -> Result<()> {
    let level: Level = level.parse()?;

    let service = planner(config)?;
    let generated = service.generate_questions_for_user(&user, level, count).await?;

    println!(
        "Generated {} {level} questions for {user} -> {}",
        generated.count, generated.filename
    );
    println!("Added {} new questions to the {level} bank.", generated.appended);
    Ok(())
}

pub fn execute(level: String, count: usize, json: bool, config: Option<PathBuf>) -> Result<()> {
    let level: Level = level.parse()?;

    let service = planner(config)?;
    let questions = service.questions(level, count)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
        return Ok(());
    }

    if questions.is_empty() {
        println!("The {level} question bank is empty.");
        return Ok(());
    }

    for (i, q) in questions.iter().enumerate() {
        println!("{}. {}", i + 1, q.question.as_deref().unwrap_or_default());
        for (j, option) in q.options.iter().enumerate() {
            println!("   {}) {option}", j + 1);
        }
    }
    Ok(())
}

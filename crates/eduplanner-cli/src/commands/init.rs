//! The `eduplanner init` command.

use std::path::Path;

use anyhow::Result;

use eduplanner_core::service::DEFAULT_PLAN;

pub fn execute() -> Result<()> {
    if Path::new("eduplanner.toml").exists() {
        println!("eduplanner.toml already exists, skipping.");
    } else {
        std::fs::write("eduplanner.toml", SAMPLE_CONFIG)?;
        println!("Created eduplanner.toml");
    }

    std::fs::create_dir_all("data")?;
    let plan_path = Path::new("data/lessonplan.txt");
    if plan_path.exists() {
        println!("data/lessonplan.txt already exists, skipping.");
    } else {
        std::fs::write(plan_path, DEFAULT_PLAN)?;
        println!("Created data/lessonplan.txt");
    }

    println!("\nNext steps:");
    println!("  1. Start Ollama (ollama serve) or configure the openai provider");
    println!("  2. Add question banks to data/ (os_questions.json, os_questions_<level>.json)");
    println!("  3. Run: eduplanner run --user alice");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# eduplanner configuration

default_provider = "ollama"
default_model = "deepseek-r1:latest"

data_dir = "./data"
cache_dir = "./cache"
rounds = 3
optimize_pause_ms = 1000
cache_ttl_secs = 3600
cache_capacity = 512

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

# OpenAI or any compatible endpoint (e.g. base_url = "https://openrouter.ai/api")
[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
"#;

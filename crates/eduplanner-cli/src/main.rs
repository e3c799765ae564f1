//! eduplanner CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "eduplanner",
    version,
    about = "CIDDP lesson-plan optimizer for Operating Systems courses"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and lesson plan
    Init,

    /// Run the evaluate/optimize/analyze loop for a user
    Run {
        /// Learner id
        #[arg(long)]
        user: String,

        /// Starting plan (defaults to the saved best plan, then data/lessonplan.txt)
        #[arg(long)]
        plan_file: Option<PathBuf>,

        /// JSON array of answered quiz questions
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Skill levels as Dimension=level, repeatable
        #[arg(long = "skill")]
        skills: Vec<String>,

        /// Write the session report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score a plan once and record it in the user's history
    Evaluate {
        #[arg(long)]
        user: String,

        /// Plan text file
        #[arg(long)]
        plan_file: PathBuf,

        /// JSON array of questions to show the evaluator
        #[arg(long)]
        questions: Option<PathBuf>,

        /// Skill levels as Dimension=level, repeatable
        #[arg(long = "skill")]
        skills: Vec<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Ask the optimizer for a revised plan
    Optimize {
        #[arg(long)]
        user: String,

        #[arg(long)]
        plan_file: PathBuf,

        /// Evaluator feedback to address
        #[arg(long, default_value = "")]
        feedback: String,

        /// Scores to record with the candidate, as a JSON object
        #[arg(long)]
        scores: Option<String>,

        /// Skill levels as Dimension=level, repeatable
        #[arg(long = "skill")]
        skills: Vec<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a user's plan history
    History {
        #[arg(long)]
        user: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print a user's best plan
    Best {
        #[arg(long)]
        user: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate quiz questions from a user's best plan
    GenerateQuestions {
        #[arg(long)]
        user: String,

        /// easy, intermediate, hard (or 1-3)
        #[arg(long, default_value = "easy")]
        level: String,

        /// Number of questions to request
        #[arg(long, default_value = "10")]
        count: usize,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Draw random questions from a level bank
    Questions {
        #[arg(long, default_value = "easy")]
        level: String,

        #[arg(long, default_value = "10")]
        count: usize,

        /// Print the questions as JSON
        #[arg(long)]
        json: bool,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eduplanner=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Run {
            user,
            plan_file,
            answers,
            skills,
            report,
            config,
        } => commands::run::execute(user, plan_file, answers, skills, report, config).await,
        Commands::Evaluate {
            user,
            plan_file,
            questions,
            skills,
            config,
        } => commands::evaluate::execute(user, plan_file, questions, skills, config).await,
        Commands::Optimize {
            user,
            plan_file,
            feedback,
            scores,
            skills,
            config,
        } => {
            commands::optimize::execute(user, plan_file, feedback, scores, skills, config).await
        }
        Commands::History { user, config } => commands::history::execute(user, config),
        Commands::Best { user, config } => commands::history::best(user, config),
        Commands::GenerateQuestions {
            user,
            level,
            count,
            config,
        } => commands::questions::generate(user, level, count, config).await,
        Commands::Questions {
            level,
            count,
            json,
            config,
        } => commands::questions::execute(level, count, json, config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

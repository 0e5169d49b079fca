mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "Codegrade CLI - Submit code for evaluation and inspect reports", long_about = None)]
struct Cli {
    /// Base URL of the Codegrade API
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a solution against a question file
    Evaluate {
        /// Question JSON file (title, description, test_cases)
        #[arg(short, long)]
        question: String,

        /// Source file with the candidate's solution
        #[arg(short, long)]
        code: String,

        /// Language name (javascript, python, java, c, cpp)
        #[arg(short, long)]
        language: String,

        /// Print the raw JSON report instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Fetch a stored evaluation report
    Report {
        /// Evaluation id returned by `evaluate`
        #[arg(short, long)]
        id: uuid::Uuid,

        /// Print the raw JSON report instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List supported languages and their execution ids
    ListLangs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            question,
            code,
            language,
            json,
        } => {
            commands::evaluate(&cli.api, &question, &code, &language, json).await?;
        }
        Commands::Report { id, json } => {
            commands::show_report(&cli.api, &id, json).await?;
        }
        Commands::ListLangs => {
            commands::list_languages();
        }
    }

    Ok(())
}

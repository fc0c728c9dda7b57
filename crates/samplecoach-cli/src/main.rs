//! samplecoach CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use samplecoach_providers::RateTier;

mod commands;

#[derive(Parser)]
#[command(
    name = "samplecoach",
    version,
    about = "Score writing samples by asking an LLM yes/no questions about them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every sample against every active question
    Run {
        /// CSV file of samples (first row is the header)
        #[arg(long)]
        samples: PathBuf,

        /// Column holding the text to evaluate
        #[arg(long)]
        sample_column: String,

        /// Column holding each sample's goal
        #[arg(long, conflicts_with = "goal")]
        goal_column: Option<String>,

        /// One goal shared by every sample
        #[arg(long)]
        goal: Option<String>,

        /// Question set JSON (default: built-in writing-quality questions)
        #[arg(long)]
        questions: Option<PathBuf>,

        /// Prompt template with $PROMPT, $SAMPLE and $QUESTION placeholders
        #[arg(long)]
        template: Option<String>,

        /// System message sent with every request
        #[arg(long)]
        system_prompt: Option<String>,

        /// Requests per window: free, trial, paid or a number
        #[arg(long)]
        rpm: Option<RateTier>,

        /// Model to ask
        #[arg(long)]
        model: Option<String>,

        /// Max requests in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, csv, html, md, all (comma-separated)
        #[arg(long, default_value = "json,csv")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a question set JSON file
    Validate {
        /// Path to question set file
        #[arg(long)]
        questions: PathBuf,
    },

    /// List available models
    ListModels {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the built-in question set as JSON
    Questions,

    /// Create starter config and question set
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("samplecoach=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            samples,
            sample_column,
            goal_column,
            goal,
            questions,
            template,
            system_prompt,
            rpm,
            model,
            concurrency,
            output,
            format,
            config,
        } => {
            let args = commands::run::RunArgs {
                samples,
                sample_column,
                goal_column,
                goal,
                questions,
                template,
                system_prompt,
                rpm,
                model,
                concurrency,
                output,
                format,
                config,
            };
            commands::run::execute(args).await
        }
        Commands::Validate { questions } => commands::validate::execute(questions),
        Commands::ListModels { config } => commands::list_models::execute(config),
        Commands::Questions => commands::questions::execute(),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

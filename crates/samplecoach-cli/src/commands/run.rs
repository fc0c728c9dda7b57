//! The `samplecoach run` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use samplecoach_core::dispatcher::ProgressTracker;
use samplecoach_core::engine::{EvalEngine, ProgressReporter};
use samplecoach_core::model::{GoalSource, QuestionSet};
use samplecoach_core::parser;
use samplecoach_core::prompt::PromptSpec;
use samplecoach_core::report::{EvaluationReport, RunSummary};
use samplecoach_core::results::RequestOutcome;
use samplecoach_core::traits::ChatProvider;
use samplecoach_providers::config::load_config_from;
use samplecoach_providers::{create_provider, RateTier};
use samplecoach_report::csv::write_csv_report;
use samplecoach_report::html::write_html_report;

/// Arguments of the `run` subcommand.
pub struct RunArgs {
    pub samples: PathBuf,
    pub sample_column: String,
    pub goal_column: Option<String>,
    pub goal: Option<String>,
    pub questions: Option<PathBuf>,
    pub template: Option<String>,
    pub system_prompt: Option<String>,
    pub rpm: Option<RateTier>,
    pub model: Option<String>,
    pub concurrency: Option<usize>,
    pub output: Option<PathBuf>,
    pub format: String,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Csv,
    Html,
    Markdown,
}

fn parse_formats(list: &str) -> Result<Vec<OutputFormat>> {
    if list.trim() == "all" {
        return Ok(vec![
            OutputFormat::Json,
            OutputFormat::Csv,
            OutputFormat::Html,
            OutputFormat::Markdown,
        ]);
    }
    let mut formats = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let format = match name {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            "html" => OutputFormat::Html,
            "md" | "markdown" => OutputFormat::Markdown,
            other => anyhow::bail!("unknown output format: '{other}'"),
        };
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    anyhow::ensure!(!formats.is_empty(), "at least one output format is required");
    Ok(formats)
}

/// Bounds on wall-clock time for a run of `buckets` windows.
///
/// The last window opens `(buckets - 1) * window` after the first, and its
/// requests may take up to one more window to finish.
fn estimated_completion(buckets: usize, window: Duration) -> (Duration, Duration) {
    let buckets = u32::try_from(buckets).unwrap_or(u32::MAX);
    (
        window.saturating_mul(buckets.saturating_sub(1)),
        window.saturating_mul(buckets),
    )
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match (secs / 3600, secs / 60 % 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}

/// Console progress reporter.
struct ConsoleReporter {
    window: Duration,
}

impl ProgressReporter for ConsoleReporter {
    fn on_run_start(&self, total_tasks: usize, buckets: usize) {
        eprintln!("samplecoach v{}: {total_tasks} requests in {buckets} window(s)", env!("CARGO_PKG_VERSION"));
        if buckets > 0 {
            let (low, high) = estimated_completion(buckets, self.window);
            eprintln!(
                "Estimated completion time: {} to {}",
                format_duration(low),
                format_duration(high)
            );
        }
        eprintln!();
    }

    fn on_outcome(&self, outcome: &RequestOutcome, progress: &ProgressTracker) {
        let status = match &outcome.error {
            None => format!("OK {:.2}", outcome.score().normalized_score),
            Some(error) => format!("FAILED: {error}"),
        };
        let retries = if outcome.retries > 0 {
            format!(" after {} retries", outcome.retries)
        } else {
            String::new()
        };
        eprintln!(
            "  [{}/{}] sample {} :: {} {status}{retries} ({}ms)",
            progress.position(),
            progress.total(),
            outcome.task.sample_index,
            outcome.task.question_key,
            outcome.latency_ms,
        );
    }

    fn on_run_complete(&self, summary: &RunSummary, elapsed: Duration) {
        eprintln!(
            "\nComplete: {}/{} succeeded, {} failed, {} timed out, {} cancelled ({:.1}s)",
            summary.succeeded,
            summary.total_tasks,
            summary.failed,
            summary.timed_out,
            summary.cancelled,
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let formats = parse_formats(&args.format)?;

    // Load config and apply command-line overrides
    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(rpm) = args.rpm {
        config.rate_tier = rpm;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(template) = args.template {
        config.prompt_template = template;
    }
    if let Some(system_prompt) = args.system_prompt {
        config.system_prompt = system_prompt;
    }
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());
    config.validate()?;

    // Load inputs
    let table = parser::load_samples(&args.samples)?;
    let questions = match &args.questions {
        Some(path) => parser::parse_question_set(path)?,
        None => QuestionSet::builtin(),
    };
    for w in parser::validate_question_set(&questions) {
        match &w.question_key {
            Some(key) => tracing::warn!(question = %key, "{}", w.message),
            None => tracing::warn!("{}", w.message),
        }
    }

    for w in parser::check_column_clashes(&table.columns, &questions) {
        tracing::warn!("{}", w.message);
    }

    let goal = match (args.goal_column, args.goal) {
        (Some(column), _) => Some(GoalSource::Column(column)),
        (None, Some(text)) => Some(GoalSource::Manual(text)),
        (None, None) => None,
    };
    let mut prompt = PromptSpec::new(config.prompt_template.clone())
        .with_sample_column(args.sample_column);
    if let Some(goal) = goal {
        prompt = prompt.with_goal(goal);
    }

    let provider: Arc<dyn ChatProvider> = Arc::from(create_provider(&config.provider)?);
    let engine_config = config.engine_config();
    let reporter = ConsoleReporter {
        window: engine_config.dispatch.window,
    };
    let engine = EvalEngine::new(provider, engine_config);

    // Ctrl-C stops submitting and resolves outstanding requests as cancelled
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling run...");
                cancel.cancel();
            }
        })
    };

    let result = engine
        .run(&table, &questions, &prompt, &reporter, cancel)
        .await;
    ctrl_c.abort();
    let report = result?;

    print_summary(&report);

    // Save outputs
    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    let questions_path = output.join(format!("questions-{timestamp}.json"));
    parser::save_question_set(&report.questions, &questions_path)?;
    eprintln!("Question set: {}", questions_path.display());

    for format in formats {
        match format {
            OutputFormat::Json => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            OutputFormat::Csv => {
                let path = output.join(format!("results-{timestamp}.csv"));
                write_csv_report(&report, &path)?;
                eprintln!("CSV results: {}", path.display());
            }
            OutputFormat::Html => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            OutputFormat::Markdown => {
                let path = output.join(format!("report-{timestamp}.md"));
                std::fs::write(&path, report.to_markdown())?;
                eprintln!("Markdown summary: {}", path.display());
            }
        }
    }

    Ok(())
}

fn print_summary(report: &EvaluationReport) {
    use comfy_table::{Cell, Table};

    if report.results.is_empty() {
        eprintln!("\nNo samples were evaluated.");
        return;
    }

    let keys: Vec<&str> = report.questions.active().map(|(key, _)| key).collect();
    let mut header = vec!["Sample".to_string(), "Weighted".to_string()];
    header.extend(keys.iter().map(|k| k.to_string()));

    let mut table = Table::new();
    table.set_header(header);

    for result in &report.results {
        let mut row = vec![
            Cell::new(result.sample_index),
            Cell::new(format!("{:.2}", result.weighted_score)),
        ];
        for key in &keys {
            let cell = match result.questions.get(*key) {
                Some(q) if q.success => format!("{:.2}", q.scored.normalized_score),
                Some(_) => "fail".to_string(),
                None => "-".to_string(),
            };
            row.push(Cell::new(cell));
        }
        table.add_row(row);
    }

    eprintln!("\n{table}");
    eprintln!(
        "Mean weighted score: {:.2}",
        report.summary.mean_weighted_score
    );
}

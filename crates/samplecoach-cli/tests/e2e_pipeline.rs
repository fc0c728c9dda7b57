//! End-to-end pipeline tests: samples and questions in, scored report out,
//! against the mock provider on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use samplecoach_core::dispatcher::DispatchConfig;
use samplecoach_core::engine::{EngineConfig, EvalEngine, NoopReporter};
use samplecoach_core::error::TaskError;
use samplecoach_core::model::{GoalSource, QuestionSet, QuestionSpec};
use samplecoach_core::parser::load_samples_from_reader;
use samplecoach_core::planner::WindowLimits;
use samplecoach_core::prompt::PromptSpec;
use samplecoach_core::report::EvaluationReport;
use samplecoach_core::retry::RetryPolicy;
use samplecoach_providers::mock::MockProvider;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SAMPLES: &str = "goal,text\nSell shoes,Buy our shoes.\nSell hats,Buy our hats.\n";

fn grammar_question() -> QuestionSet {
    let mut questions = QuestionSet::new();
    questions.insert(
        "grammar",
        QuestionSpec::yes_no("Does the passage have grammar errors?", 0.0, 1),
    );
    questions
}

fn config(requests_per_window: usize) -> EngineConfig {
    EngineConfig {
        dispatch: DispatchConfig {
            retry: RetryPolicy::new(5, Duration::from_secs(1)).with_jitter(|| 0.0),
            ..Default::default()
        },
        limits: WindowLimits::new(requests_per_window),
    }
}

fn prompt() -> PromptSpec {
    PromptSpec::new("Goal: $PROMPT\n\nResponse:\n```\n$SAMPLE\n```\n\n$QUESTION")
        .with_sample_column("text")
        .with_goal(GoalSource::Column("goal".into()))
}

async fn run(
    provider: Arc<MockProvider>,
    config: EngineConfig,
    samples: &str,
    cancel: CancellationToken,
) -> EvaluationReport {
    let table = load_samples_from_reader(samples.as_bytes()).unwrap();
    EvalEngine::new(provider, config)
        .run(&table, &grammar_question(), &prompt(), &NoopReporter, cancel)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn e2e_single_sample_negative_answer_scores_one() {
    let provider = Arc::new(MockProvider::with_fixed_response("No, it does not."));
    let samples = "goal,text\nSell shoes,Buy our shoes.\n";
    let report = run(provider.clone(), config(10), samples, CancellationToken::new()).await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].weighted_score, 1.0);
    let request = provider.last_request().unwrap();
    assert_eq!(
        request.prompt,
        "Goal: Sell shoes\n\nResponse:\n```\nBuy our shoes.\n```\n\nDoes the passage have grammar errors?"
    );
    assert_eq!(request.model, "gpt-3.5-turbo");
}

#[tokio::test(start_paused = true)]
async fn e2e_one_request_per_window_spaces_buckets() {
    let provider = Arc::new(MockProvider::with_fixed_response("no"));
    let start = Instant::now();
    let report = run(provider.clone(), config(1), SAMPLES, CancellationToken::new()).await;

    assert_eq!(report.summary.buckets, 2);
    assert_eq!(report.summary.succeeded, 2);
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn e2e_rate_limits_then_success() {
    let provider = Arc::new(MockProvider::with_fixed_response("no").rate_limited_for(2));
    let samples = "goal,text\nSell shoes,Buy our shoes.\n";
    let start = Instant::now();
    let report = run(provider.clone(), config(10), samples, CancellationToken::new()).await;

    let question = &report.results[0].questions["grammar"];
    assert!(question.success);
    assert_eq!(question.retries, 2);
    assert_eq!(question.error, None);
    // 1s then 2s of backoff with zero jitter
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn e2e_persistent_rate_limit_times_out() {
    let provider = Arc::new(MockProvider::with_fixed_response("no").always_rate_limited());
    let samples = "goal,text\nSell shoes,Buy our shoes.\n";
    let report = run(provider.clone(), config(10), samples, CancellationToken::new()).await;

    let question = &report.results[0].questions["grammar"];
    assert!(!question.success);
    assert_eq!(question.error, Some(TaskError::Timeout));
    assert_eq!(question.retries, 5);
    assert_eq!(report.results[0].weighted_score, 0.0);
    assert_eq!(report.summary.timed_out, 1);
    assert_eq!(provider.call_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn e2e_cancellation_resolves_every_task() {
    let provider = Arc::new(
        MockProvider::with_fixed_response("no").with_latency(Duration::from_secs(30)),
    );
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
    }

    let report = run(provider, config(1), SAMPLES, cancel).await;

    assert_eq!(report.summary.total_tasks, 2);
    assert_eq!(report.summary.cancelled, 2);
    assert_eq!(report.results.len(), 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.questions["grammar"].error == Some(TaskError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn e2e_report_round_trips_through_json() {
    let provider = Arc::new(MockProvider::with_fixed_response("Yes, several."));
    let report = run(provider, config(10), SAMPLES, CancellationToken::new()).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.save_json(&path).unwrap();
    let loaded = EvaluationReport::load_json(&path).unwrap();

    assert_eq!(loaded.results, report.results);
    assert_eq!(loaded.summary, report.summary);
    assert!(loaded.results.iter().all(|r| r.weighted_score == 0.0));
}

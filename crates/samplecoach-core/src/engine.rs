//! Evaluation engine orchestrator.
//!
//! Builds tasks from a sample table and question set, plans them into
//! rate-limit windows, dispatches them and folds the outcomes into an
//! [`EvaluationReport`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::dispatcher::{DispatchConfig, Dispatcher, ProgressTracker};
use crate::error::ConfigError;
use crate::model::{QuestionSet, SampleTable};
use crate::planner::{plan_buckets, WindowLimits};
use crate::prompt::{build_tasks, PromptSpec};
use crate::report::{EvaluationReport, RunSummary};
use crate::results::RequestOutcome;

/// Configuration for the evaluation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    /// Per-window request and token limits used for planning.
    pub limits: WindowLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            limits: WindowLimits::new(3500),
        }
    }
}

impl EngineConfig {
    /// Check settings that would otherwise fail only after dispatch began.
    pub fn validate(&self, questions: &QuestionSet) -> Result<(), ConfigError> {
        if self.limits.max_requests == 0 {
            return Err(ConfigError::ZeroRequestLimit);
        }
        if self.dispatch.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        for (key, question) in questions.active() {
            if question.num_responses == 0 {
                return Err(ConfigError::ZeroResponses(key.to_string()));
            }
            if !question.weight.is_finite() || question.weight < 0.0 {
                return Err(ConfigError::InvalidWeight(key.to_string()));
            }
        }
        Ok(())
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, total_tasks: usize, buckets: usize);
    fn on_outcome(&self, outcome: &RequestOutcome, progress: &ProgressTracker);
    fn on_run_complete(&self, summary: &RunSummary, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_run_start(&self, _: usize, _: usize) {}
    fn on_outcome(&self, _: &RequestOutcome, _: &ProgressTracker) {}
    fn on_run_complete(&self, _: &RunSummary, _: Duration) {}
}

/// The evaluation engine.
pub struct EvalEngine {
    dispatcher: Dispatcher,
    config: EngineConfig,
}

impl EvalEngine {
    pub fn new(provider: Arc<dyn crate::traits::ChatProvider>, config: EngineConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(provider, config.dispatch.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate every sample against every active question.
    ///
    /// Configuration errors are returned before any request is sent.
    /// Individual task failures never fail the run; they are recorded in
    /// the report.
    pub async fn run(
        &self,
        table: &SampleTable,
        questions: &QuestionSet,
        prompt: &PromptSpec,
        progress: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<EvaluationReport> {
        let start = Instant::now();
        self.config.validate(questions)?;

        let tasks = build_tasks(&table.rows, questions, prompt)?;
        let total_tasks = tasks.len();
        let buckets = plan_buckets(tasks, self.config.limits);
        let bucket_count = buckets.len();

        tracing::info!(
            samples = table.rows.len(),
            questions = questions.active_count(),
            tasks = total_tasks,
            buckets = bucket_count,
            "starting evaluation"
        );
        progress.on_run_start(total_tasks, bucket_count);

        let tracker = Arc::new(ProgressTracker::new(total_tasks));
        let mut rx = self
            .dispatcher
            .dispatch(buckets, Arc::clone(&tracker), cancel);

        let mut aggregator = Aggregator::new();
        while let Some(outcome) = rx.recv().await {
            progress.on_outcome(&outcome, &tracker);
            aggregator.record(outcome);
        }

        let (results, counts) = aggregator.finish();
        let summary = RunSummary::new(total_tasks, bucket_count, counts, &results);
        let elapsed = start.elapsed();

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            cancelled = summary.cancelled,
            elapsed_ms = elapsed.as_millis() as u64,
            "evaluation finished"
        );
        progress.on_run_complete(&summary, elapsed);

        Ok(EvaluationReport {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            model: self.config.dispatch.model.clone(),
            template: prompt.template.clone(),
            columns: table.columns.clone(),
            questions: questions.clone(),
            results,
            summary,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

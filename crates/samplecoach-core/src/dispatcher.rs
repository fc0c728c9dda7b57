//! Dispatcher: runs planned buckets against a provider.
//!
//! Scheduling has two levels. Buckets are submitted in order, at most one
//! per `window`; submission does not wait for the previous bucket to
//! drain. Every task then waits for a slot in a worker pool of
//! `concurrency` permits shared by all buckets.
//!
//! Workers send each [`RequestOutcome`] over a channel to a single
//! consumer. Cancelling the token stops submission and resolves every
//! remaining task, queued, in flight or backing off, as
//! [`TaskError::Cancelled`], so each task still yields exactly one outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::model::{Bucket, Task};
use crate::results::RequestOutcome;
use crate::retry::RetryPolicy;
use crate::traits::{ChatProvider, ChatRequest, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};

/// Configuration for dispatching requests.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum spacing between bucket submissions.
    pub window: Duration,
    /// Maximum requests in flight across all buckets.
    pub concurrency: usize,
    /// Backoff for rate-limited requests.
    pub retry: RetryPolicy,
    /// Model requested for every task.
    pub model: String,
    /// System message sent with every task.
    pub system_prompt: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            concurrency: 50,
            retry: RetryPolicy::default(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Shared progress counters, safe to read from any thread.
///
/// `position` follows the highest task index recorded so far (reported as
/// `index + 1`, so it runs from 0 to `total`). Because tasks finish out of
/// order it can run ahead of the true completion count, which is tracked
/// separately in `completed`.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: usize,
    position: AtomicUsize,
    completed: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            position: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Note that the task with `global_index` has been recorded.
    pub fn record(&self, global_index: usize) {
        self.position.fetch_max(global_index + 1, Ordering::AcqRel);
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    /// Highest recorded task index plus one; never decreases.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Number of tasks recorded.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed() as f64 / self.total as f64
        }
    }
}

struct WorkerContext {
    provider: Arc<dyn ChatProvider>,
    config: DispatchConfig,
    semaphore: Semaphore,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

/// Executes buckets against a provider.
pub struct Dispatcher {
    provider: Arc<dyn ChatProvider>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn ChatProvider>, config: DispatchConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Start dispatching `buckets` in the background.
    ///
    /// The returned channel yields one outcome per task and closes once
    /// every task has resolved. Must be called within a Tokio runtime.
    pub fn dispatch(
        &self,
        buckets: Vec<Bucket>,
        progress: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<RequestOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(WorkerContext {
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
            semaphore: Semaphore::new(self.config.concurrency.max(1)),
            progress,
            cancel,
        });
        tokio::spawn(submit_buckets(buckets, ctx, tx));
        rx
    }

    /// Dispatch and collect every outcome, in arrival order.
    pub async fn run(
        &self,
        buckets: Vec<Bucket>,
        progress: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Vec<RequestOutcome> {
        let mut rx = self.dispatch(buckets, progress, cancel);
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn submit_buckets(
    buckets: Vec<Bucket>,
    ctx: Arc<WorkerContext>,
    tx: mpsc::UnboundedSender<RequestOutcome>,
) {
    let mut ticker = tokio::time::interval(ctx.config.window.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = buckets.into_iter();
    while let Some(bucket) = pending.next() {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let remaining: usize = bucket.len() + pending.as_slice().iter().map(Bucket::len).sum::<usize>();
                tracing::info!(remaining, "run cancelled, skipping unsubmitted windows");
                for task in std::iter::once(bucket).chain(pending.by_ref()).flat_map(|b| b.tasks) {
                    send(&ctx, &tx, RequestOutcome::failed(task, TaskError::Cancelled, 0, 0));
                }
                return;
            }
            _ = ticker.tick() => {}
        }

        tracing::info!(bucket = bucket.index, tasks = bucket.len(), "submitting window");
        tokio::spawn(run_bucket(bucket, Arc::clone(&ctx), tx.clone()));
    }
}

async fn run_bucket(bucket: Bucket, ctx: Arc<WorkerContext>, tx: mpsc::UnboundedSender<RequestOutcome>) {
    let index = bucket.index;
    let mut running: FuturesUnordered<_> = bucket
        .tasks
        .into_iter()
        .map(|task| execute_task(task, &ctx))
        .collect();

    while let Some(outcome) = running.next().await {
        send(&ctx, &tx, outcome);
    }
    tracing::debug!(bucket = index, "window drained");
}

fn send(ctx: &WorkerContext, tx: &mpsc::UnboundedSender<RequestOutcome>, outcome: RequestOutcome) {
    ctx.progress.record(outcome.task.global_index);
    if tx.send(outcome).is_err() {
        tracing::debug!("outcome receiver dropped");
    }
}

/// Run one task to resolution: success, terminal error, exhausted retries
/// or cancellation.
async fn execute_task(task: Task, ctx: &WorkerContext) -> RequestOutcome {
    let start = Instant::now();
    let elapsed_ms = |start: Instant| start.elapsed().as_millis() as u64;

    let _permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            return RequestOutcome::failed(task, TaskError::Cancelled, 0, 0);
        }
        permit = ctx.semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return RequestOutcome::failed(task, TaskError::Cancelled, 0, 0),
        },
    };

    let request = ChatRequest {
        model: ctx.config.model.clone(),
        system_prompt: ctx.config.system_prompt.clone(),
        prompt: task.prompt.clone(),
        n: task.question.num_responses,
    };
    let retry = &ctx.config.retry;
    let mut retries = 0u32;

    loop {
        tracing::debug!(index = task.global_index, retries, "sending request");
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return RequestOutcome::failed(task, TaskError::Cancelled, retries, elapsed_ms(start));
            }
            result = ctx.provider.complete(&request) => result,
        };

        let err = match result {
            Ok(response) => {
                return RequestOutcome::succeeded(task, response, retries, elapsed_ms(start));
            }
            Err(err) => err,
        };

        if !retry.is_retryable(&err) {
            tracing::debug!(index = task.global_index, error = %err, "request failed");
            let error = TaskError::Remote {
                message: format!("{err:#}"),
            };
            return RequestOutcome::failed(task, error, retries, elapsed_ms(start));
        }

        let Some(delay) = retry.next_delay(retries) else {
            tracing::warn!(index = task.global_index, retries, "rate limit retries exhausted");
            return RequestOutcome::failed(task, TaskError::Timeout, retries, elapsed_ms(start));
        };

        tracing::warn!(
            index = task.global_index,
            retries,
            delay_ms = delay.as_millis() as u64,
            "rate limited, backing off"
        );
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return RequestOutcome::failed(task, TaskError::Cancelled, retries, elapsed_ms(start));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        retries += 1;
    }
}

//! Aggregator: folds task outcomes into per-sample results.
//!
//! Outcomes may arrive in any order. Results are keyed by sample index and
//! question key, and weighted scores are computed only in [`Aggregator::finish`],
//! so the final table does not depend on arrival order.

use std::collections::BTreeMap;

use crate::results::{QuestionResult, RequestOutcome, SampleResult};

/// Counts of how tasks resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

/// Incremental merge of outcomes into sample results.
#[derive(Debug, Default)]
pub struct Aggregator {
    samples: BTreeMap<usize, SampleResult>,
    counts: OutcomeCounts,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome.
    pub fn record(&mut self, outcome: RequestOutcome) {
        use crate::error::TaskError;

        match (&outcome.error, outcome.success) {
            (_, true) => self.counts.succeeded += 1,
            (Some(TaskError::Timeout), _) => self.counts.timed_out += 1,
            (Some(TaskError::Cancelled), _) => self.counts.cancelled += 1,
            _ => self.counts.failed += 1,
        }

        let sample = self
            .samples
            .entry(outcome.task.sample_index)
            .or_insert_with(|| SampleResult::new(&outcome.task.sample));
        let key = outcome.task.question_key.clone();
        if sample
            .questions
            .insert(key.clone(), QuestionResult::from(outcome))
            .is_some()
        {
            tracing::warn!(
                sample = sample.sample_index,
                question = %key,
                "duplicate outcome replaced an earlier one"
            );
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    /// Samples seen so far.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Compute weighted scores and return results ordered by sample index.
    pub fn finish(self) -> (Vec<SampleResult>, OutcomeCounts) {
        let results = self
            .samples
            .into_values()
            .map(|mut sample| {
                sample.compute_weighted_score();
                sample
            })
            .collect();
        (results, self.counts)
    }
}

impl Extend<RequestOutcome> for Aggregator {
    fn extend<I: IntoIterator<Item = RequestOutcome>>(&mut self, iter: I) {
        for outcome in iter {
            self.record(outcome);
        }
    }
}

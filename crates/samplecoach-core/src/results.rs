//! Per-task and per-sample result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::model::{SampleRow, Task};
use crate::scoring::{score_completions, ScoredOutcome};
use crate::traits::ChatResponse;

/// What happened to one dispatched task. Produced exactly once per task.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub task: Task,
    /// The API response, present only on success.
    pub response: Option<ChatResponse>,
    pub success: bool,
    pub error: Option<TaskError>,
    /// Rate-limit retries consumed before the task resolved.
    pub retries: u32,
    /// Wall-clock time from first attempt to resolution.
    pub latency_ms: u64,
}

impl RequestOutcome {
    pub fn succeeded(task: Task, response: ChatResponse, retries: u32, latency_ms: u64) -> Self {
        Self {
            task,
            response: Some(response),
            success: true,
            error: None,
            retries,
            latency_ms,
        }
    }

    pub fn failed(task: Task, error: TaskError, retries: u32, latency_ms: u64) -> Self {
        Self {
            task,
            response: None,
            success: false,
            error: Some(error),
            retries,
            latency_ms,
        }
    }

    /// Score this outcome's completions against its question.
    ///
    /// A failed outcome has no completions and scores zero.
    pub fn score(&self) -> ScoredOutcome {
        match &self.response {
            Some(response) => score_completions(&self.task.question, &response.completions),
            None => ScoredOutcome::default(),
        }
    }
}

/// The recorded answer to one question about one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    /// Prompt text that was sent.
    pub prompt: String,
    #[serde(default)]
    pub raw_response: Option<ChatResponse>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub latency_ms: u64,
    /// Weight of the question at the time of the run.
    pub weight: f64,
    pub scored: ScoredOutcome,
}

impl From<RequestOutcome> for QuestionResult {
    fn from(outcome: RequestOutcome) -> Self {
        let scored = outcome.score();
        Self {
            weight: outcome.task.question.weight,
            prompt: outcome.task.prompt,
            raw_response: outcome.response,
            success: outcome.success,
            error: outcome.error,
            retries: outcome.retries,
            latency_ms: outcome.latency_ms,
            scored,
        }
    }
}

/// Everything known about one sample after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub sample_index: usize,
    /// The row as loaded.
    pub original_row: BTreeMap<String, String>,
    /// Question key → result.
    pub questions: BTreeMap<String, QuestionResult>,
    /// Weighted mean of successful questions' normalized scores, rounded to
    /// two decimals; 0 when none succeeded.
    pub weighted_score: f64,
}

impl SampleResult {
    pub fn new(row: &SampleRow) -> Self {
        Self {
            sample_index: row.sample_index,
            original_row: row.fields.clone(),
            questions: BTreeMap::new(),
            weighted_score: 0.0,
        }
    }

    /// Recompute `weighted_score` from the recorded questions.
    pub fn compute_weighted_score(&mut self) -> f64 {
        let (numerator, denominator) = self
            .questions
            .values()
            .filter(|q| q.success)
            .fold((0.0, 0.0), |(num, den), q| {
                (num + q.scored.normalized_score * q.weight, den + q.weight)
            });

        self.weighted_score = if denominator > 0.0 {
            round2(numerator / denominator)
        } else {
            0.0
        };
        self.weighted_score
    }

    /// Normalized score for one question, if it was asked.
    pub fn question_score(&self, key: &str) -> Option<f64> {
        self.questions.get(key).map(|q| q.scored.normalized_score)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

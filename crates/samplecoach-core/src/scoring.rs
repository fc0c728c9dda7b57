//! Response Scorer: turns free-text completions into a numeric score.

use serde::{Deserialize, Serialize};

use crate::model::QuestionSpec;

/// Score derived from one task's completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredOutcome {
    /// Mean score over completions that matched an answer; 0 if none did.
    pub normalized_score: f64,
    /// Sum of matched answer scores.
    pub raw_score: f64,
    /// Completions that matched an answer.
    pub matched_answer_count: u32,
}

/// Strip everything except ASCII letters, digits and whitespace, lowercase,
/// and split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Index of the first token where `needle` occurs as a contiguous run.
fn first_occurrence(tokens: &[String], needle: &[String]) -> Option<usize> {
    if needle.is_empty() || needle.len() > tokens.len() {
        return None;
    }
    tokens.windows(needle.len()).position(|w| w == needle)
}

/// Score of the answer whose label appears earliest in `completion`.
///
/// On a tie the first declared answer wins. Returns `None` when no label
/// occurs at all.
pub fn match_answer(question: &QuestionSpec, completion: &str) -> Option<f64> {
    let tokens = tokenize(completion);
    let mut best: Option<(usize, f64)> = None;

    for answer in &question.answers {
        let label = tokenize(&answer.label);
        if let Some(idx) = first_occurrence(&tokens, &label) {
            if best.map_or(true, |(best_idx, _)| idx < best_idx) {
                best = Some((idx, answer.score));
            }
        }
    }

    best.map(|(_, score)| score)
}

/// Score all completions of one response.
///
/// Completions that mention no answer label are left out of the
/// denominator rather than counted as zero.
pub fn score_completions<S: AsRef<str>>(question: &QuestionSpec, completions: &[S]) -> ScoredOutcome {
    let mut raw_score = 0.0;
    let mut matched = 0u32;

    for completion in completions {
        if let Some(score) = match_answer(question, completion.as_ref()) {
            raw_score += score;
            matched += 1;
        }
    }

    ScoredOutcome {
        normalized_score: if matched > 0 {
            raw_score / matched as f64
        } else {
            0.0
        },
        raw_score,
        matched_answer_count: matched,
    }
}

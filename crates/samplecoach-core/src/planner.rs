//! Bucket Planner: partitions tasks into rate-limit windows.

use crate::model::{Bucket, Task};

/// Token budget per window used when none is configured.
pub const DEFAULT_TOKENS_PER_WINDOW: u64 = 3_500_000;

/// Words per token assumed by [`estimate_tokens`].
const WORDS_PER_TOKEN: f64 = 0.66;

/// Per-window limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    /// Maximum requests placed in one window.
    pub max_requests: usize,
    /// Advisory token budget for one window.
    pub max_tokens: u64,
}

impl WindowLimits {
    pub fn new(max_requests: usize) -> Self {
        Self {
            max_requests,
            max_tokens: DEFAULT_TOKENS_PER_WINDOW,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Approximate token count of a prompt: `round(words / 0.66)`.
pub fn estimate_tokens(prompt: &str) -> u64 {
    let words = prompt.split_whitespace().count();
    (words as f64 / WORDS_PER_TOKEN).round() as u64
}

/// Split `tasks` into ordered buckets.
///
/// The window-full check runs before a task is placed and only looks at the
/// tasks already in the window, so a bucket never holds more than
/// `max_requests` tasks but may exceed `max_tokens` by its last task. A
/// bucket is never closed while empty.
pub fn plan_buckets(tasks: Vec<Task>, limits: WindowLimits) -> Vec<Bucket> {
    let max_requests = limits.max_requests.max(1);
    let mut buckets = Vec::new();
    let mut current = Bucket::default();
    let mut tokens = 0u64;

    for task in tasks {
        let full = current.len() >= max_requests || tokens >= limits.max_tokens;
        if full && !current.is_empty() {
            let next_index = current.index + 1;
            buckets.push(std::mem::replace(
                &mut current,
                Bucket {
                    index: next_index,
                    tasks: Vec::new(),
                },
            ));
            tokens = 0;
        }
        tokens += estimate_tokens(&task.prompt);
        current.tasks.push(task);
    }

    if !current.is_empty() {
        buckets.push(current);
    }

    tracing::debug!(
        buckets = buckets.len(),
        max_requests,
        max_tokens = limits.max_tokens,
        "planned rate-limit windows"
    );
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionSpec, SampleRow};
    use std::sync::Arc;

    fn task(index: usize, prompt: &str) -> Task {
        Task {
            global_index: index,
            sample_index: index,
            question_key: "q".into(),
            prompt: prompt.into(),
            question: Arc::new(QuestionSpec::yes_no("q", 1.0, 1)),
            sample: Arc::new(SampleRow::new(index, Default::default())),
        }
    }

    fn tasks(n: usize) -> Vec<Task> {
        (0..n).map(|i| task(i, "one two three")).collect()
    }

    fn indices(buckets: &[Bucket]) -> Vec<Vec<usize>> {
        buckets
            .iter()
            .map(|b| b.tasks.iter().map(|t| t.global_index).collect())
            .collect()
    }

    #[test]
    fn estimate_is_conservative() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one"), 2);
        assert_eq!(estimate_tokens("one two three"), 5);
        assert_eq!(estimate_tokens("a  b\n\tc   d"), 6);
    }

    #[test]
    fn request_cap_splits_windows() {
        let buckets = plan_buckets(tasks(7), WindowLimits::new(3));
        assert_eq!(indices(&buckets), vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        assert_eq!(
            buckets.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn one_request_per_window() {
        let buckets = plan_buckets(tasks(2), WindowLimits::new(1));
        assert_eq!(indices(&buckets), vec![vec![0], vec![1]]);
    }

    #[test]
    fn concatenation_preserves_input() {
        for cap in 1..6 {
            for budget in [1, 4, 9, 100] {
                let limits = WindowLimits::new(cap).with_max_tokens(budget);
                let buckets = plan_buckets(tasks(11), limits);
                let flat: Vec<usize> = indices(&buckets).into_iter().flatten().collect();
                assert_eq!(flat, (0..11).collect::<Vec<_>>());
                assert!(buckets.iter().all(|b| !b.is_empty() && b.len() <= cap));
            }
        }
    }

    #[test]
    fn token_budget_is_checked_before_insertion() {
        // Each prompt estimates to 5 tokens; the window closes once it has
        // reached 10, after the second task pushed it there.
        let limits = WindowLimits::new(100).with_max_tokens(10);
        let buckets = plan_buckets(tasks(5), limits);
        assert_eq!(indices(&buckets), vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn oversized_task_sits_alone() {
        let big = vec!["word"; 1000].join(" ");
        let input = vec![task(0, "a b"), task(1, &big), task(2, "c d")];
        let limits = WindowLimits::new(100).with_max_tokens(50);
        let buckets = plan_buckets(input, limits);
        // The big task joins the first window (only 3 tokens so far) and
        // pushes it over budget; the next task starts a fresh window.
        assert_eq!(indices(&buckets), vec![vec![0, 1], vec![2]]);

        let input = vec![task(0, &big), task(1, "a")];
        let buckets = plan_buckets(input, limits);
        assert_eq!(indices(&buckets), vec![vec![0], vec![1]]);
    }

    #[test]
    fn zero_budget_never_produces_empty_buckets() {
        let limits = WindowLimits::new(10).with_max_tokens(0);
        let buckets = plan_buckets(tasks(3), limits);
        assert_eq!(indices(&buckets), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(plan_buckets(Vec::new(), WindowLimits::new(5)).is_empty());
    }
}

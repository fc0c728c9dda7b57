//! Prompt Builder: expands samples × active questions into tasks.

use std::sync::Arc;

use crate::error::ConfigError;
use crate::model::{GoalSource, QuestionSet, SampleRow, Task};

/// Placeholder replaced with the goal text.
pub const GOAL_PLACEHOLDER: &str = "$PROMPT";
/// Placeholder replaced with the sample text.
pub const SAMPLE_PLACEHOLDER: &str = "$SAMPLE";
/// Placeholder replaced with the question text.
pub const QUESTION_PLACEHOLDER: &str = "$QUESTION";

/// How prompts are assembled for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSpec {
    /// Template containing `$PROMPT`, `$SAMPLE` and `$QUESTION`.
    pub template: String,
    /// Column holding the text being evaluated.
    pub sample_column: Option<String>,
    /// Column or manual string supplying the goal.
    pub goal: Option<GoalSource>,
}

impl PromptSpec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            sample_column: None,
            goal: None,
        }
    }

    pub fn with_sample_column(mut self, column: impl Into<String>) -> Self {
        self.sample_column = Some(column.into());
        self
    }

    pub fn with_goal(mut self, goal: GoalSource) -> Self {
        self.goal = Some(goal);
        self
    }
}

/// Substitute the three placeholders in a single left-to-right pass.
///
/// Every occurrence is replaced. Inserted text is never rescanned, so a
/// sample that itself contains `$QUESTION` is passed through verbatim.
pub fn render_template(template: &str, goal: &str, sample: &str, question: &str) -> String {
    let placeholders = [
        (GOAL_PLACEHOLDER, goal),
        (SAMPLE_PLACEHOLDER, sample),
        (QUESTION_PLACEHOLDER, question),
    ];

    let mut out = String::with_capacity(template.len() + goal.len() + sample.len() + question.len());
    let mut rest = template;

    'outer: while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (token, value) in placeholders {
            if let Some(after) = tail.strip_prefix(token) {
                out.push_str(value);
                rest = after;
                continue 'outer;
            }
        }
        out.push('$');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// Build one task per (sample, active question) pair.
///
/// Tasks are ordered by `sample_index`, then by question declaration order.
pub fn build_tasks(
    rows: &[SampleRow],
    questions: &QuestionSet,
    spec: &PromptSpec,
) -> Result<Vec<Task>, ConfigError> {
    let sample_column = spec
        .sample_column
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ConfigError::MissingSampleColumn)?;
    let goal = match &spec.goal {
        Some(GoalSource::Column(c)) if c.is_empty() => return Err(ConfigError::MissingGoalSource),
        Some(goal) => goal,
        None => return Err(ConfigError::MissingGoalSource),
    };

    let active: Vec<(&str, Arc<_>)> = questions
        .active()
        .map(|(key, q)| (key, Arc::new(q.clone())))
        .collect();
    let per_sample = active.len();

    let mut tasks = Vec::with_capacity(rows.len() * per_sample);
    for row in rows {
        let sample_text = field(row, sample_column)?;
        let goal_text = match goal {
            GoalSource::Column(column) => field(row, column)?,
            GoalSource::Manual(text) => text.as_str(),
        };
        let sample = Arc::new(row.clone());

        for (ordinal, (key, question)) in active.iter().enumerate() {
            tasks.push(Task {
                global_index: row.sample_index * per_sample + ordinal,
                sample_index: row.sample_index,
                question_key: (*key).to_string(),
                prompt: render_template(&spec.template, goal_text, sample_text, &question.text),
                question: Arc::clone(question),
                sample: Arc::clone(&sample),
            });
        }
    }

    tracing::debug!(
        samples = rows.len(),
        active_questions = per_sample,
        tasks = tasks.len(),
        "built evaluation tasks"
    );
    Ok(tasks)
}

fn field<'a>(row: &'a SampleRow, column: &str) -> Result<&'a str, ConfigError> {
    row.get(column).ok_or_else(|| ConfigError::MissingField {
        sample_index: row.sample_index,
        column: column.to_string(),
    })
}

//! Evaluation report types with JSON persistence and a flat result table.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::OutcomeCounts;
use crate::model::QuestionSet;
use crate::results::SampleResult;

/// Name of the aggregate score column in exported tables.
pub const WEIGHTED_SCORE_COLUMN: &str = "weightedScore";

/// A complete evaluation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Unique run identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Model the questions were put to.
    pub model: String,
    /// Prompt template used for every task.
    pub template: String,
    /// Sample table columns, in load order.
    pub columns: Vec<String>,
    /// The question set as supplied, unchanged.
    pub questions: QuestionSet,
    /// One entry per sample that had at least one task.
    pub results: Vec<SampleResult>,
    pub summary: RunSummary,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Counts describing how a run went.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_tasks: usize,
    pub buckets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Mean of per-sample weighted scores; 0 with no samples.
    pub mean_weighted_score: f64,
}

impl RunSummary {
    pub fn new(total_tasks: usize, buckets: usize, counts: OutcomeCounts, results: &[SampleResult]) -> Self {
        let mean_weighted_score = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.weighted_score).sum::<f64>() / results.len() as f64
        };
        Self {
            total_tasks,
            buckets,
            succeeded: counts.succeeded,
            failed: counts.failed,
            timed_out: counts.timed_out,
            cancelled: counts.cancelled,
            mean_weighted_score,
        }
    }

    /// Tasks that did not succeed for any reason.
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.timed_out + self.cancelled
    }
}

impl EvaluationReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: EvaluationReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Header of the flat result table: sample columns, the weighted score,
    /// then one column per question.
    pub fn table_header(&self) -> Vec<String> {
        self.columns
            .iter()
            .cloned()
            .chain(std::iter::once(WEIGHTED_SCORE_COLUMN.to_string()))
            .chain(self.questions.keys().map(str::to_string))
            .collect()
    }

    /// Rows of the flat result table, aligned with [`Self::table_header`].
    ///
    /// Questions that were not asked about a sample (inactive questions)
    /// leave an empty cell.
    pub fn table_rows(&self) -> Vec<Vec<String>> {
        self.results
            .iter()
            .map(|result| {
                let mut row: Vec<String> = self
                    .columns
                    .iter()
                    .map(|c| result.original_row.get(c).cloned().unwrap_or_default())
                    .collect();
                row.push(format_score(result.weighted_score));
                row.extend(self.questions.keys().map(|key| {
                    result
                        .question_score(key)
                        .map(format_score)
                        .unwrap_or_default()
                }));
                row
            })
            .collect()
    }

    /// Format the result table as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} samples, {}/{} tasks succeeded, mean weighted score {:.2}\n\n",
            self.results.len(),
            self.summary.succeeded,
            self.summary.total_tasks,
            self.summary.mean_weighted_score
        ));

        if self.results.is_empty() {
            return md;
        }

        let keys: Vec<&str> = self.questions.keys().collect();
        md.push_str("| Sample | Weighted |");
        for key in &keys {
            md.push_str(&format!(" {key} |"));
        }
        md.push('\n');
        md.push_str("|--------|----------|");
        for _ in &keys {
            md.push_str("------|");
        }
        md.push('\n');

        for result in &self.results {
            md.push_str(&format!(
                "| {} | {:.2} |",
                result.sample_index, result.weighted_score
            ));
            for key in &keys {
                match result.questions.get(*key) {
                    Some(q) if q.success => md.push_str(&format!(" {:.2} |", q.scored.normalized_score)),
                    Some(_) => md.push_str(" failed |"),
                    None => md.push_str(" - |"),
                }
            }
            md.push('\n');
        }

        md
    }
}

fn format_score(score: f64) -> String {
    let formatted = format!("{score:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionSpec;
    use crate::results::QuestionResult;
    use crate::scoring::ScoredOutcome;
    use std::collections::BTreeMap;

    fn question_result(success: bool, score: f64) -> QuestionResult {
        QuestionResult {
            prompt: "p".into(),
            raw_response: None,
            success,
            error: None,
            retries: 0,
            latency_ms: 0,
            weight: 1.0,
            scored: ScoredOutcome {
                normalized_score: score,
                raw_score: score,
                matched_answer_count: 1,
            },
        }
    }

    fn make_report() -> EvaluationReport {
        let mut questions = QuestionSet::new();
        questions.insert("clarity", QuestionSpec::yes_no("Clear?", 1.0, 1));
        questions.insert("tone", QuestionSpec::yes_no("Tone?", 1.0, 1));

        let mut row = BTreeMap::new();
        row.insert("text".to_string(), "Hello there".to_string());
        row.insert("goal".to_string(), "Greet".to_string());

        let mut qs = BTreeMap::new();
        qs.insert("clarity".to_string(), question_result(true, 0.8));
        let results = vec![SampleResult {
            sample_index: 0,
            original_row: row,
            questions: qs,
            weighted_score: 0.8,
        }];

        EvaluationReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            model: "gpt-3.5-turbo".into(),
            template: "$SAMPLE".into(),
            columns: vec!["goal".into(), "text".into()],
            questions,
            summary: RunSummary::new(1, 1, OutcomeCounts { succeeded: 1, ..Default::default() }, &results),
            results,
            duration_ms: 12,
        }
    }

    #[test]
    fn table_has_original_columns_then_scores() {
        let report = make_report();
        assert_eq!(
            report.table_header(),
            vec!["goal", "text", "weightedScore", "clarity", "tone"]
        );
        assert_eq!(
            report.table_rows(),
            vec![vec!["Greet", "Hello there", "0.8", "0.8", ""]]
        );
    }

    #[test]
    fn score_formatting_trims_zeros() {
        assert_eq!(format_score(1.0), "1");
        assert_eq!(format_score(0.0), "0");
        assert_eq!(format_score(0.25), "0.25");
        assert_eq!(format_score(2.0 / 3.0), "0.6667");
    }

    #[test]
    fn summary_mean_and_unsuccessful() {
        let report = make_report();
        assert_eq!(report.summary.mean_weighted_score, 0.8);
        let summary = RunSummary {
            failed: 1,
            timed_out: 2,
            cancelled: 3,
            ..Default::default()
        };
        assert_eq!(summary.unsuccessful(), 6);
    }

    #[test]
    fn json_roundtrip_keeps_question_order() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        report.save_json(&path).unwrap();
        let loaded = EvaluationReport::load_json(&path).unwrap();

        assert_eq!(loaded.results, report.results);
        assert_eq!(loaded.questions, report.questions);
        assert_eq!(loaded.questions.keys().collect::<Vec<_>>(), vec!["clarity", "tone"]);
    }

    #[test]
    fn markdown_output() {
        let md = make_report().to_markdown();
        assert!(md.contains("1/1 tasks succeeded"));
        assert!(md.contains("| 0 | 0.80 | 0.80 | - |"));
    }
}

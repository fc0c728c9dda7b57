//! Loaders for question sets (JSON) and sample tables (CSV), plus question
//! set validation.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::{QuestionSet, SampleRow, SampleTable};
use crate::report::WEIGHTED_SCORE_COLUMN;
use crate::scoring::tokenize;

/// Parse a question set from a JSON file.
pub fn parse_question_set(path: &Path) -> Result<QuestionSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question file: {}", path.display()))?;

    parse_question_set_str(&content, path)
}

/// Parse a JSON string into a `QuestionSet` (useful for testing).
pub fn parse_question_set_str(content: &str, source_path: &Path) -> Result<QuestionSet> {
    serde_json::from_str(content)
        .with_context(|| format!("failed to parse question JSON: {}", source_path.display()))
}

/// Write a question set as pretty JSON that [`parse_question_set`] reads back.
pub fn save_question_set(set: &QuestionSet, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(set).context("failed to serialize question set")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("failed to write question set to {}", path.display()))?;
    Ok(())
}

/// Load a sample table from a CSV file with a header row.
pub fn load_samples(path: &Path) -> Result<SampleTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open sample file: {}", path.display()))?;
    load_samples_from_reader(file)
        .with_context(|| format!("failed to parse sample CSV: {}", path.display()))
}

/// Load a sample table from any CSV source.
///
/// Rows whose cells are all blank are skipped and do not consume a sample
/// index. Short rows are padded with empty cells.
pub fn load_samples_from_reader<R: Read>(reader: R) -> Result<SampleTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()
        .context("missing header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            skipped += 1;
            continue;
        }
        let fields: BTreeMap<String, String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.clone(), record.get(i).unwrap_or_default().to_string()))
            .collect();
        rows.push(SampleRow::new(rows.len(), fields));
    }

    if skipped > 0 {
        tracing::warn!(skipped, "skipped blank sample rows");
    }
    tracing::debug!(rows = rows.len(), columns = columns.len(), "loaded samples");

    Ok(SampleTable { columns, rows })
}

/// A warning from question set validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The question key (if applicable).
    pub question_key: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn question(key: &str, message: impl Into<String>) -> Self {
        Self {
            question_key: Some(key.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a question set for common issues.
pub fn validate_question_set(set: &QuestionSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if set.active_count() == 0 {
        warnings.push(ValidationWarning {
            question_key: None,
            message: "no active questions; a run would send no requests".into(),
        });
    }

    for (key, question) in set.iter() {
        if question.text.trim().is_empty() {
            warnings.push(ValidationWarning::question(key, "question text is empty"));
        }
        if question.answers.is_empty() {
            warnings.push(ValidationWarning::question(
                key,
                "no answers declared; every response will be unmatched",
            ));
        }
        if question.num_responses == 0 {
            warnings.push(ValidationWarning::question(key, "numResponses must be at least 1"));
        }
        if !question.weight.is_finite() || question.weight < 0.0 {
            warnings.push(ValidationWarning::question(
                key,
                format!("weight {} is negative or not finite", question.weight),
            ));
        }

        let mut seen = HashSet::new();
        for answer in &question.answers {
            let normalized = tokenize(&answer.label);
            if normalized.is_empty() {
                warnings.push(ValidationWarning::question(
                    key,
                    format!("answer '{}' has no letters or digits and can never match", answer.label),
                ));
            } else if !seen.insert(normalized) {
                warnings.push(ValidationWarning::question(
                    key,
                    format!("duplicate answer '{}'; only the first is used", answer.label),
                ));
            }
        }
    }

    warnings
}

/// Warn about sample columns whose names collide with result table columns.
///
/// The result table appends `weightedScore` and one column per question to
/// the sample columns, so a clash yields duplicate headers in the exports.
pub fn check_column_clashes(columns: &[String], set: &QuestionSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    for column in columns {
        if column == WEIGHTED_SCORE_COLUMN {
            warnings.push(ValidationWarning {
                question_key: None,
                message: format!(
                    "sample column '{column}' has the same name as the weighted score column"
                ),
            });
        }
        if set.get(column).is_some() {
            warnings.push(ValidationWarning::question(
                column,
                format!("sample column '{column}' has the same name as this question"),
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_JSON: &str = r#"{
  "tone": {
    "question": "Is the tone friendly? Start your reply with a `yes` or `no`.",
    "answers": [{"answer": "yes", "score": 1}, {"answer": "no", "score": 0}],
    "active": true,
    "numResponses": 5,
    "weight": 2
  },
  "clarity": {
    "question": "Is it clear?",
    "answers": [{"answer": "yes", "score": 1}, {"answer": "no", "score": 0}]
  }
}"#;

    #[test]
    fn parse_valid_json_keeps_order() {
        let set = parse_question_set_str(VALID_JSON, &PathBuf::from("q.json")).unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["tone", "clarity"]);
        let tone = set.get("tone").unwrap();
        assert_eq!(tone.num_responses, 5);
        assert_eq!(tone.weight, 2.0);
        assert_eq!(tone.answers[0].label, "yes");
    }

    #[test]
    fn parse_missing_optional_fields() {
        let set = parse_question_set_str(VALID_JSON, &PathBuf::from("q.json")).unwrap();
        let clarity = set.get("clarity").unwrap();
        assert!(clarity.active);
        assert_eq!(clarity.num_responses, 3);
        assert_eq!(clarity.weight, 1.0);
    }

    #[test]
    fn parse_malformed_json() {
        let result = parse_question_set_str("{ not json", &PathBuf::from("bad.json"));
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }

    #[test]
    fn parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(&path, VALID_JSON).unwrap();
        let set = parse_question_set(&path).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn builtin_set_has_no_warnings() {
        assert!(validate_question_set(&QuestionSet::builtin()).is_empty());
    }

    #[test]
    fn validate_flags_problems() {
        let json = r#"{
  "empty": {"question": " ", "answers": [], "numResponses": 0, "weight": -1},
  "dupes": {"question": "q", "answers": [{"answer": "Yes", "score": 1}, {"answer": "yes!", "score": 0}, {"answer": "??", "score": 0}]}
}"#;
        let set = parse_question_set_str(json, &PathBuf::from("q.json")).unwrap();
        let warnings = validate_question_set(&set);
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();

        assert!(messages.iter().any(|m| m.contains("text is empty")));
        assert!(messages.iter().any(|m| m.contains("no answers")));
        assert!(messages.iter().any(|m| m.contains("at least 1")));
        assert!(messages.iter().any(|m| m.contains("negative")));
        assert!(messages.iter().any(|m| m.contains("duplicate answer 'yes!'")));
        assert!(messages.iter().any(|m| m.contains("'??'")));
    }

    #[test]
    fn validate_no_active_questions() {
        let json = r#"{"q": {"question": "q", "answers": [{"answer": "yes", "score": 1}], "active": false}}"#;
        let set = parse_question_set_str(json, &PathBuf::from("q.json")).unwrap();
        let warnings = validate_question_set(&set);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].question_key, None);
    }

    #[test]
    fn load_csv_samples() {
        let csv = "goal,text\nSell shoes,Buy now!\n,\nSell hats,\"Hats, hats, hats\"\n";
        let table = load_samples_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["goal", "text"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].sample_index, 1);
        assert_eq!(table.rows[1].get("text"), Some("Hats, hats, hats"));
    }

    #[test]
    fn short_rows_are_padded() {
        let csv = "goal,text,extra\nSell,Buy\n";
        let table = load_samples_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.rows[0].get("extra"), Some(""));
    }

    #[test]
    fn load_samples_missing_file() {
        let err = load_samples(Path::new("/nonexistent/samples.csv")).unwrap_err();
        assert!(err.to_string().contains("failed to open sample file"));
    }

    #[test]
    fn saved_question_set_loads_back_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out/questions.json");
        let set = QuestionSet::builtin();

        save_question_set(&set, &path).unwrap();
        let loaded = parse_question_set(&path).unwrap();

        assert_eq!(loaded, set);
        assert!(loaded.keys().eq(set.keys()));
    }

    #[test]
    fn column_clashes_are_reported() {
        let set = QuestionSet::builtin();
        let columns = vec![
            "goal".to_string(),
            "weightedScore".to_string(),
            "grammar".to_string(),
        ];
        let warnings = check_column_clashes(&columns, &set);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].question_key, None);
        assert!(warnings[0].message.contains("weightedScore"));
        assert_eq!(warnings[1].question_key.as_deref(), Some("grammar"));

        let plain = vec!["goal".to_string(), "text".to_string()];
        assert!(check_column_clashes(&plain, &set).is_empty());
    }
}

//! Core data model types for samplecoach.
//!
//! Questions, samples, and the evaluation tasks built from them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One candidate answer to a question and the score it is worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Label matched case-insensitively against response tokens.
    #[serde(rename = "answer")]
    pub label: String,
    pub score: f64,
}

impl Answer {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// A yes/no style question asked about every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    /// Question text substituted for `$QUESTION` in the prompt template.
    #[serde(rename = "question")]
    pub text: String,
    /// Candidate answers in declaration order.
    #[serde(default)]
    pub answers: Vec<Answer>,
    /// Inactive questions are skipped when building tasks.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Completions requested per task (the API's `n` parameter).
    #[serde(default = "default_num_responses")]
    pub num_responses: u32,
    /// Relative contribution to a sample's weighted score.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_true() -> bool {
    true
}

fn default_num_responses() -> u32 {
    3
}

fn default_weight() -> f64 {
    1.0
}

impl QuestionSpec {
    /// A yes/no question where `yes_score` is awarded for "yes" and
    /// `1 - yes_score` for "no".
    pub fn yes_no(text: impl Into<String>, yes_score: f64, num_responses: u32) -> Self {
        Self {
            text: text.into(),
            answers: vec![Answer::new("yes", yes_score), Answer::new("no", 1.0 - yes_score)],
            active: true,
            num_responses,
            weight: 1.0,
        }
    }
}

/// Questions keyed by name, in declaration order.
///
/// Serializes as a JSON object whose key order matches the order questions
/// were declared, so an exported set round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionSet {
    entries: Vec<(String, QuestionSpec)>,
}

impl QuestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a question, replacing any existing question with the same key
    /// in place.
    pub fn insert(&mut self, key: impl Into<String>, spec: QuestionSpec) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = spec,
            None => self.entries.push((key, spec)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&QuestionSpec> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuestionSpec)> {
        self.entries.iter().map(|(k, spec)| (k.as_str(), spec))
    }

    /// Active questions in declaration order.
    pub fn active(&self) -> impl Iterator<Item = (&str, &QuestionSpec)> {
        self.iter().filter(|(_, spec)| spec.active)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// The writing-quality questions shipped as defaults.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        set.insert(
            "grammar",
            QuestionSpec::yes_no(
                "Does the passage above have any grammar errors? Start your reply with a `yes` or `no`.",
                0.0,
                10,
            ),
        );
        set.insert(
            "spelling",
            QuestionSpec::yes_no(
                "Does the passage above have any spelling errors? Start your reply with a `yes` or `no`.",
                0.0,
                10,
            ),
        );
        set.insert(
            "spelling_and_grammar",
            QuestionSpec::yes_no(
                "Does the passage above have any spelling or grammar errors? Start your reply with a `yes` or `no`.",
                0.0,
                10,
            ),
        );
        set.insert(
            "native_speaker",
            QuestionSpec::yes_no(
                "Was the passage above written by a native English speaker? Start your reply with a `yes` or `no`.",
                1.0,
                10,
            ),
        );
        set.insert(
            "meets_goal",
            QuestionSpec::yes_no(
                "Does the passage above clearly meet the goal? Start your reply with a `yes` or `no`.",
                1.0,
                5,
            ),
        );
        set.insert(
            "vivid_details",
            QuestionSpec::yes_no(
                "Does the passage use vivid details to bring the story to life? Start your reply with a `yes` or `no`.",
                1.0,
                5,
            ),
        );
        set.insert(
            "engaging",
            QuestionSpec::yes_no(
                "Is the passage engaging to read? Start your reply with a `yes` or `no`.",
                1.0,
                5,
            ),
        );
        set.insert(
            "professional",
            QuestionSpec::yes_no(
                "Is the passage written in a professional way? Start your reply with a `yes` or `no`.",
                1.0,
                5,
            ),
        );
        set
    }
}

impl FromIterator<(String, QuestionSpec)> for QuestionSet {
    fn from_iter<I: IntoIterator<Item = (String, QuestionSpec)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, spec) in iter {
            set.insert(key, spec);
        }
        set
    }
}

impl Serialize for QuestionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, spec) in &self.entries {
            map.serialize_entry(key, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for QuestionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuestionSetVisitor;

        impl<'de> Visitor<'de> for QuestionSetVisitor {
            type Value = QuestionSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of question keys to question definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = QuestionSet::new();
                while let Some((key, spec)) = access.next_entry::<String, QuestionSpec>()? {
                    set.insert(key, spec);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(QuestionSetVisitor)
    }
}

/// One row of the sample table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Position assigned at load time; never reused.
    pub sample_index: usize,
    /// Column name → cell value.
    pub fields: BTreeMap<String, String>,
}

impl SampleRow {
    pub fn new(sample_index: usize, fields: BTreeMap<String, String>) -> Self {
        Self {
            sample_index,
            fields,
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// Ordered sample rows together with the column order they were loaded in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    pub columns: Vec<String>,
    pub rows: Vec<SampleRow>,
}

/// Where the text substituted for `$PROMPT` comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSource {
    /// Read the goal from this column of each row.
    Column(String),
    /// Use one goal string for every row.
    Manual(String),
}

/// One (sample, question) evaluation unit with a fully substituted prompt.
#[derive(Debug, Clone)]
pub struct Task {
    /// `sample_index * active_question_count + question_ordinal`.
    pub global_index: usize,
    pub sample_index: usize,
    pub question_key: String,
    pub prompt: String,
    pub question: Arc<QuestionSpec>,
    pub sample: Arc<SampleRow>,
}

/// Tasks assigned to the same rate-limit window.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub index: usize,
    pub tasks: Vec<Task>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

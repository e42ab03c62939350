use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short blake3 fingerprint identifying one act of submitting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

/// Hex chars kept from the blake3 digest.
pub const SUBMISSION_ID_LEN: usize = 12;

impl SubmissionId {
    /// Fingerprint arbitrary bytes into a short id.
    pub fn fingerprint(bytes: &[u8]) -> Self {
        let hex = blake3::hash(bytes).to_hex();
        Self(hex.as_str()[..SUBMISSION_ID_LEN].to_string())
    }

    /// Wrap an id read back from a store.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One answer as it arrives from the form.
///
/// Untagged so a JSON answer file reads naturally: `"x"`, `true`, `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    /// Nothing a CSV cell could tell apart from an absent answer.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.is_empty(),
            AnswerValue::Choices(items) => items.iter().all(String::is_empty),
            AnswerValue::Flag(_) => false,
        }
    }

    /// Empty or whitespace only. Kept in storage but says nothing.
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::Choices(items) => items.iter().all(|i| i.trim().is_empty()),
            AnswerValue::Flag(_) => false,
        }
    }

    /// Individual values this answer contributes to a count.
    pub fn items(&self) -> Vec<String> {
        match self {
            AnswerValue::Text(s) => vec![s.clone()],
            AnswerValue::Flag(b) => vec![b.to_string()],
            AnswerValue::Choices(items) => items.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Text(s) => f.write_str(s),
            AnswerValue::Flag(b) => write!(f, "{}", b),
            AnswerValue::Choices(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Question key to answer. Column order comes from the schema, not this map.
pub type Answers = BTreeMap<String, AnswerValue>;

/// An accepted answer set. Never edited after it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: SubmissionId,
    pub timestamp: DateTime<Utc>,
    pub answers: Answers,
}

impl Submission {
    pub fn answer(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.get(key)
    }

    /// Text of a single-valued answer, or `None` when absent or not text.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.answers.get(key).and_then(AnswerValue::as_text)
    }
}

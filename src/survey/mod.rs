pub mod row;
pub mod types;

use crate::error::ValidationError;

use types::{AnswerValue, Answers};

/// Separator between fields inside a fingerprint input. Cannot be typed into a form.
const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    /// Short single-line text (name, email, numbers typed as text).
    Text,
    /// Open comment; feeds the content hash and the keyword classifiers.
    FreeText,
    Flag,
    SingleChoice,
    MultiChoice,
}

impl QuestionKind {
    fn expected(self) -> &'static str {
        match self {
            QuestionKind::Flag => "a yes/no value",
            QuestionKind::MultiChoice => "a list of options",
            QuestionKind::Text | QuestionKind::FreeText | QuestionKind::SingleChoice => "text",
        }
    }

    fn accepts(self, value: &AnswerValue) -> bool {
        matches!(
            (self, value),
            (QuestionKind::Flag, AnswerValue::Flag(_))
                | (QuestionKind::MultiChoice, AnswerValue::Choices(_))
                | (
                    QuestionKind::Text | QuestionKind::FreeText | QuestionKind::SingleChoice,
                    AnswerValue::Text(_)
                )
        )
    }
}

#[derive(Debug, Clone)]
pub struct Question {
    pub key: String,
    pub label: String,
    pub kind: QuestionKind,
    /// Options shown on the form. Informational; answers are not checked against them.
    pub options: Vec<String>,
}

impl Question {
    fn new(key: &str, label: &str, kind: QuestionKind) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind,
            options: Vec::new(),
        }
    }

    fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Related question keys whose answers are counted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldGroup {
    pub name: String,
    pub keys: Vec<String>,
}

impl FieldGroup {
    pub fn new(name: &str, keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// The fixed question set a deployment records.
#[derive(Debug, Clone)]
pub struct SurveySchema {
    pub questions: Vec<Question>,
    /// Multi-select question that must have at least one selection.
    pub required: String,
    /// Question holding the submitter's contact email.
    pub contact_field: String,
    pub identity_fields: Vec<String>,
    pub free_text_fields: Vec<String>,
    pub groups: Vec<FieldGroup>,
}

impl SurveySchema {
    pub fn question(&self, key: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.key == key)
    }

    /// Question keys in column order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.questions.iter().map(|q| q.key.as_str())
    }

    pub fn group(&self, name: &str) -> Option<&FieldGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Check an answer set. Runs before any store is touched.
    pub fn validate(&self, answers: &Answers) -> Result<(), ValidationError> {
        for (key, value) in answers {
            let question = self
                .question(key)
                .ok_or_else(|| ValidationError::UnknownQuestion(key.clone()))?;
            if !question.kind.accepts(value) {
                return Err(ValidationError::WrongKind {
                    field: key.clone(),
                    expected: question.kind.expected(),
                });
            }
        }

        match answers.get(&self.required) {
            Some(value @ AnswerValue::Choices(_)) if !value.is_blank() => Ok(()),
            _ => Err(ValidationError::MissingRequired {
                field: self.required.clone(),
            }),
        }
    }

    /// Drop empty answers and empty selections; an empty cell reads back as absent.
    ///
    /// Whitespace is kept as given so the stored row matches the input.
    pub fn normalize(&self, answers: Answers) -> Answers {
        answers
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    AnswerValue::Choices(items) => AnswerValue::Choices(
                        items.into_iter().filter(|i| !i.is_empty()).collect(),
                    ),
                    other => other,
                };
                (key, value)
            })
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }

    /// Fingerprint over identity and free-text fields, used to spot resubmissions.
    ///
    /// `None` when every one of those fields is blank: there is nothing to
    /// recognise a resubmission by, so such answer sets never count as duplicates.
    pub fn content_hash(&self, answers: &Answers) -> Option<String> {
        let mut input = String::new();
        let mut any = false;
        for key in self.identity_fields.iter().chain(&self.free_text_fields) {
            if let Some(value) = answers.get(key).filter(|v| !v.is_blank()) {
                input.push_str(&normalize_text(&value.to_string()));
                any = true;
            }
            input.push(FIELD_SEPARATOR);
        }
        any.then(|| blake3::hash(input.as_bytes()).to_hex().to_string())
    }

    /// Every present answer as `key=value` lines in column order.
    pub fn canonical_content(&self, answers: &Answers) -> String {
        let mut out = String::new();
        for key in self.keys() {
            if let Some(value) = answers.get(key) {
                out.push_str(key);
                out.push('=');
                out.push_str(&value.to_string());
                out.push('\n');
            }
        }
        out
    }

    /// The teacher-feedback survey for the report-comment dropdown tool.
    pub fn teacher_feedback() -> Self {
        use QuestionKind::*;

        const METHODS: &[&str] = &["Writing from scratch", "ChatGPT/AI", "Dropdown tool", "Other"];
        const TIME_PER_COMMENT: &[&str] =
            &["<1 min", "1-2 min", "2-5 min", "5-10 min", "10+ min", "Didn't use"];

        let questions = vec![
            Question::new("name", "Name", Text),
            Question::new("email", "Email", Text),
            Question::new("year_group", "Year group taught", SingleChoice),
            Question::new("class_size", "Class size", SingleChoice)
                .with_options(&["<15", "15-25", "26-30", "31+"]),
            Question::new("methods", "Methods used for report comments", MultiChoice)
                .with_options(METHODS),
            Question::new("time_per_comment_scratch", "Time per comment: writing from scratch", SingleChoice)
                .with_options(TIME_PER_COMMENT),
            Question::new("time_per_comment_ai", "Time per comment: ChatGPT/AI", SingleChoice)
                .with_options(TIME_PER_COMMENT),
            Question::new("time_per_comment_dropdown", "Time per comment: dropdown tool", SingleChoice)
                .with_options(TIME_PER_COMMENT),
            Question::new("biggest_cognitive_relief", "Cognitive relief", SingleChoice).with_options(&[
                "No need to decide what to include/exclude",
                "Character count automatically perfect",
                "No rephrasing/editing needed",
                "Curriculum-aligned language pre-written",
                "Clear structure removes blank page stress",
                "Consistency across all students",
                "Didn't use",
            ]),
            Question::new("biggest_time_quality", "Best time-to-quality", SingleChoice).with_options(&[
                "Writing from scratch",
                "ChatGPT/AI",
                "Dropdown tool",
                "Other",
                "Didn't use",
            ]),
            Question::new("time_saved", "Time saved for your class size", SingleChoice).with_options(&[
                "No time saved",
                "30min-1hr",
                "1-2hrs",
                "2-4hrs",
                "4+hrs",
                CUSTOM_HOURS_OPTION,
                "Didn't use",
            ]),
            Question::new("custom_hours_saved", "Approximate time saved (hours)", Text),
            Question::new("would_recommend", "Would recommend to a colleague", Flag),
            Question::new("value_comments", "What worked well", FreeText),
            Question::new("limitation_comments", "What got in the way", FreeText),
            Question::new("suggestions", "Suggestions", FreeText),
        ];

        Self {
            questions,
            required: "methods".to_string(),
            contact_field: "email".to_string(),
            identity_fields: vec!["name".to_string(), "email".to_string()],
            free_text_fields: vec![
                "value_comments".to_string(),
                "limitation_comments".to_string(),
                "suggestions".to_string(),
            ],
            groups: vec![
                FieldGroup::new(
                    "time_per_comment",
                    &[
                        "time_per_comment_scratch",
                        "time_per_comment_ai",
                        "time_per_comment_dropdown",
                    ],
                ),
                FieldGroup::new("time_saved", &["time_saved"]),
                FieldGroup::new("methods", &["methods"]),
                FieldGroup::new("cognitive_relief", &["biggest_cognitive_relief"]),
                FieldGroup::new("time_quality", &["biggest_time_quality"]),
            ],
        }
    }
}

/// `time_saved` option that makes `custom_hours_saved` meaningful.
pub const CUSTOM_HOURS_OPTION: &str = "Custom hours (specify below)";

/// Trim, collapse internal whitespace, lowercase.
fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

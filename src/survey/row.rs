//! Flat row format shared by every CSV-shaped store.
//!
//! Multi-select answers are joined with `", "` and split on it again when
//! read back. An option label that itself contains `", "` comes back as
//! several items; the format has no escaping for it.

use chrono::{DateTime, SecondsFormat, Utc};
use csv::StringRecord;

use super::types::{AnswerValue, Answers, Submission, SubmissionId};
use super::{QuestionKind, SurveySchema};
use crate::store::StoreError;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const ID_COLUMN: &str = "submission_id";
pub const MULTI_SEPARATOR: &str = ", ";

/// `timestamp`, `submission_id`, then every question key in schema order.
pub fn header(schema: &SurveySchema) -> Vec<String> {
    let mut columns = vec![TIMESTAMP_COLUMN.to_string(), ID_COLUMN.to_string()];
    columns.extend(schema.keys().map(str::to_string));
    columns
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn encode(schema: &SurveySchema, submission: &Submission) -> Vec<String> {
    let mut cells = vec![
        format_timestamp(&submission.timestamp),
        submission.submission_id.to_string(),
    ];
    for key in schema.keys() {
        cells.push(
            submission
                .answers
                .get(key)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        );
    }
    cells
}

/// Reject a file whose columns were written for a different question set.
pub fn check_header(schema: &SurveySchema, found: &StringRecord) -> Result<(), StoreError> {
    let expected = header(schema);
    if found.iter().eq(expected.iter().map(String::as_str)) {
        Ok(())
    } else {
        Err(StoreError::HeaderMismatch {
            expected,
            found: found.iter().map(str::to_string).collect(),
        })
    }
}

/// Decode one data row. `row` is 1-based, counting data rows only.
pub fn decode(
    schema: &SurveySchema,
    record: &StringRecord,
    row: usize,
) -> Result<Submission, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt { row, reason };

    let raw_ts = record
        .get(0)
        .ok_or_else(|| corrupt("missing timestamp".to_string()))?;
    let timestamp = DateTime::parse_from_rfc3339(raw_ts)
        .map_err(|e| corrupt(format!("bad timestamp {:?}: {}", raw_ts, e)))?
        .with_timezone(&Utc);

    let raw_id = record.get(1).unwrap_or("");
    if raw_id.is_empty() {
        return Err(corrupt("missing submission_id".to_string()));
    }

    let mut answers = Answers::new();
    for (i, question) in schema.questions.iter().enumerate() {
        let cell = record.get(i + 2).unwrap_or("");
        if cell.is_empty() {
            continue;
        }
        let value = match question.kind {
            QuestionKind::Flag => match cell.to_ascii_lowercase().as_str() {
                "true" => AnswerValue::Flag(true),
                "false" => AnswerValue::Flag(false),
                _ => {
                    return Err(corrupt(format!(
                        "'{}' is not a yes/no value: {:?}",
                        question.key, cell
                    )))
                }
            },
            QuestionKind::MultiChoice => AnswerValue::Choices(
                cell.split(MULTI_SEPARATOR).map(str::to_string).collect(),
            ),
            QuestionKind::Text | QuestionKind::FreeText | QuestionKind::SingleChoice => {
                AnswerValue::Text(cell.to_string())
            }
        };
        answers.insert(question.key.clone(), value);
    }

    Ok(Submission {
        submission_id: SubmissionId::from_stored(raw_id),
        timestamp,
        answers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::tests::{answers, choices, text};

    fn sample() -> Submission {
        Submission {
            submission_id: SubmissionId::from_stored("a1b2c3d4e5f6"),
            timestamp: DateTime::parse_from_rfc3339("2026-06-30T14:05:09Z")
                .unwrap()
                .with_timezone(&Utc),
            answers: answers(&[
                ("methods", choices(&["ChatGPT/AI", "Dropdown tool"])),
                ("time_saved", text("4+hrs")),
                ("would_recommend", AnswerValue::Flag(true)),
                ("value_comments", text("Quick, and \"consistent\"\nacross classes")),
            ]),
        }
    }

    #[test]
    fn test_header_layout() {
        let schema = SurveySchema::teacher_feedback();
        let h = header(&schema);
        assert_eq!(h[0], "timestamp");
        assert_eq!(h[1], "submission_id");
        assert_eq!(h[2], "name");
        assert_eq!(h.len(), schema.questions.len() + 2);
    }

    #[test]
    fn test_encode_joins_choices_and_leaves_absent_blank() {
        let schema = SurveySchema::teacher_feedback();
        let cells = encode(&schema, &sample());
        assert_eq!(cells[0], "2026-06-30T14:05:09Z");
        assert_eq!(cells[1], "a1b2c3d4e5f6");
        let methods = header(&schema).iter().position(|c| c == "methods").unwrap();
        assert_eq!(cells[methods], "ChatGPT/AI, Dropdown tool");
        let name = header(&schema).iter().position(|c| c == "name").unwrap();
        assert_eq!(cells[name], "");
    }

    #[test]
    fn test_decode_recovers_encoded_row() {
        let schema = SurveySchema::teacher_feedback();
        let record = StringRecord::from(encode(&schema, &sample()));
        assert_eq!(decode(&schema, &record, 1).unwrap(), sample());
    }

    #[test]
    fn test_decode_splits_label_containing_separator() {
        let schema = SurveySchema::teacher_feedback();
        let mut sub = sample();
        sub.answers
            .insert("methods".to_string(), choices(&["Other, unlisted"]));
        let record = StringRecord::from(encode(&schema, &sub));
        let back = decode(&schema, &record, 1).unwrap();
        assert_eq!(back.answers["methods"], choices(&["Other", "unlisted"]));
    }

    #[test]
    fn test_decode_rejects_bad_flag() {
        let schema = SurveySchema::teacher_feedback();
        let mut cells = encode(&schema, &sample());
        let idx = header(&schema)
            .iter()
            .position(|c| c == "would_recommend")
            .unwrap();
        cells[idx] = "maybe".to_string();
        let err = decode(&schema, &StringRecord::from(cells), 7).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { row: 7, .. }));
    }

    #[test]
    fn test_check_header_mismatch() {
        let schema = SurveySchema::teacher_feedback();
        let found = StringRecord::from(vec!["timestamp", "submission_id", "name"]);
        assert!(matches!(
            check_header(&schema, &found),
            Err(StoreError::HeaderMismatch { .. })
        ));
        let ok = StringRecord::from(header(&schema));
        assert!(check_header(&schema, &ok).is_ok());
    }
}

pub mod classify;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use crate::store::{MasterStore, StoreError};
use crate::survey::types::Submission;
use crate::survey::{FieldGroup, SurveySchema, CUSTOM_HOURS_OPTION};

use classify::{classify_field, KeywordTable};

/// Which entries count as repeats of an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Identical answer field-set. Recorder stamps are excluded; they differ on every call.
    #[default]
    ExactFields,
    /// Same content hash over identity and free-text fields.
    ContentHash,
}

/// Answer counts in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    entries: Vec<(String, usize)>,
}

impl CategoryCounts {
    pub fn add(&mut self, category: &str) {
        match self.entries.iter_mut().find(|(c, _)| c == category) {
            Some((_, n)) => *n += 1,
            None => self.entries.push((category.to_string(), 1)),
        }
    }

    pub fn get(&self, category: &str) -> usize {
        self.entries
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(c, n)| (c.as_str(), *n))
    }
}

/// Reads the master store for the dashboard.
pub struct Aggregator {
    master: Arc<dyn MasterStore>,
}

impl Aggregator {
    pub fn new(master: Arc<dyn MasterStore>) -> Self {
        Self { master }
    }

    /// Every row in the master store, duplicates included.
    pub async fn load(&self) -> Result<Vec<Submission>, StoreError> {
        let rows = self.master.read_all().await?;
        debug!(rows = rows.len(), "master store loaded");
        Ok(rows)
    }
}

/// Drop entries that repeat an earlier one, keeping the first. Idempotent.
///
/// Under `ContentHash`, answer sets with no identity or comment text have no
/// hash and are always kept.
pub fn deduplicate(
    schema: &SurveySchema,
    submissions: Vec<Submission>,
    policy: DedupPolicy,
) -> Vec<Submission> {
    match policy {
        DedupPolicy::ExactFields => {
            let mut seen = HashSet::new();
            submissions
                .into_iter()
                .filter(|s| seen.insert(s.answers.clone()))
                .collect()
        }
        DedupPolicy::ContentHash => {
            let mut seen = HashSet::new();
            submissions
                .into_iter()
                .filter(|s| match schema.content_hash(&s.answers) {
                    Some(hash) => seen.insert(hash),
                    None => true,
                })
                .collect()
        }
    }
}

/// Flatten the group's answers into one multiset and count each value.
pub fn aggregate(submissions: &[Submission], group: &FieldGroup) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for submission in submissions {
        for key in &group.keys {
            if let Some(value) = submission.answer(key) {
                for item in value.items() {
                    counts.add(&item);
                }
            }
        }
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Upper bound the form allowed for an hours figure.
const MAX_HOURS: f64 = 100.0;

/// Count/mean/min/max over answers to `key` that parse as hours in 0..=100.
pub fn numeric_summary<'a>(
    submissions: impl IntoIterator<Item = &'a Submission>,
    key: &str,
) -> Option<NumericSummary> {
    let values: Vec<f64> = submissions
        .into_iter()
        .filter_map(|s| s.text(key))
        .filter_map(|t| t.trim().parse::<f64>().ok())
        .filter(|v| (0.0..=MAX_HOURS).contains(v))
        .collect();
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(NumericSummary {
        count: values.len(),
        mean: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Everything the dashboard shows, computed from one load of the master store.
#[derive(Debug, Clone)]
pub struct DashboardReport {
    pub policy: DedupPolicy,
    pub raw_rows: usize,
    pub unique_rows: usize,
    pub groups: Vec<(String, CategoryCounts)>,
    pub themes: Vec<(String, CategoryCounts)>,
    pub sentiment: Vec<(String, CategoryCounts)>,
    pub custom_hours: Option<NumericSummary>,
}

impl DashboardReport {
    pub fn build(schema: &SurveySchema, raw: Vec<Submission>, policy: DedupPolicy) -> Self {
        let raw_rows = raw.len();
        let unique = deduplicate(schema, raw, policy);

        let groups = schema
            .groups
            .iter()
            .map(|g| (g.name.clone(), aggregate(&unique, g)))
            .collect();

        let themes_table = KeywordTable::themes();
        let sentiment_table = KeywordTable::sentiment();
        let themes = schema
            .free_text_fields
            .iter()
            .map(|f| (f.clone(), classify_field(&unique, f, &themes_table)))
            .collect();
        let sentiment = schema
            .free_text_fields
            .iter()
            .map(|f| (f.clone(), classify_field(&unique, f, &sentiment_table)))
            .collect();

        let custom_hours = numeric_summary(
            unique
                .iter()
                .filter(|s| s.text("time_saved") == Some(CUSTOM_HOURS_OPTION)),
            "custom_hours_saved",
        );

        Self {
            policy,
            raw_rows,
            unique_rows: unique.len(),
            groups,
            themes,
            sentiment,
            custom_hours,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Responses: {} unique of {} recorded ({:?} deduplication)",
            self.unique_rows, self.raw_rows, self.policy
        );

        for (name, counts) in &self.groups {
            render_counts(&mut out, name, counts);
        }
        for (field, counts) in &self.themes {
            render_counts(&mut out, &format!("{} themes", field), counts);
        }
        for (field, counts) in &self.sentiment {
            render_counts(&mut out, &format!("{} sentiment", field), counts);
        }

        if let Some(s) = &self.custom_hours {
            let _ = writeln!(
                out,
                "\n[custom hours saved]\n  n={} mean={:.1} min={:.1} max={:.1}",
                s.count, s.mean, s.min, s.max
            );
        }
        out
    }
}

fn render_counts(out: &mut String, title: &str, counts: &CategoryCounts) {
    let _ = writeln!(out, "\n[{}]", title);
    if counts.is_empty() {
        let _ = writeln!(out, "  (no answers)");
        return;
    }
    for (category, n) in counts.iter() {
        let _ = writeln!(out, "  {:<44} {}", category, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecorderError;
    use crate::recorder::tests::valid_answers;
    use crate::recorder::Recorder;
    use crate::store::csv_file::CsvMasterStore;
    use crate::survey::tests::{answers, choices, text};
    use crate::survey::types::{AnswerValue, SubmissionId};
    use chrono::{TimeZone, Utc};

    fn sub(id: &str, pairs: &[(&str, AnswerValue)]) -> Submission {
        Submission {
            submission_id: SubmissionId::from_stored(id),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 2, 10, 0, 0).unwrap(),
            answers: answers(pairs),
        }
    }

    fn setup(dir: &std::path::Path) -> (Recorder, Aggregator, Arc<SurveySchema>) {
        let schema = Arc::new(SurveySchema::teacher_feedback());
        let master: Arc<dyn MasterStore> = Arc::new(CsvMasterStore::new(dir, schema.clone()));
        (
            Recorder::new(schema.clone(), master.clone()),
            Aggregator::new(master),
            schema,
        )
    }

    #[test]
    fn test_aggregate_counts_in_first_occurrence_order() {
        let schema = SurveySchema::teacher_feedback();
        let subs = vec![
            sub("a", &[
                ("time_per_comment_scratch", text("5-10 min")),
                ("time_per_comment_dropdown", text("<1 min")),
            ]),
            sub("b", &[
                ("time_per_comment_ai", text("1-2 min")),
                ("time_per_comment_dropdown", text("<1 min")),
            ]),
        ];
        let counts = aggregate(&subs, schema.group("time_per_comment").unwrap());
        assert_eq!(
            counts.iter().collect::<Vec<_>>(),
            vec![("5-10 min", 1), ("<1 min", 2), ("1-2 min", 1)]
        );
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.get("10+ min"), 0);
    }

    #[test]
    fn test_aggregate_expands_choices_and_flags() {
        let subs = vec![
            sub("a", &[
                ("methods", choices(&["ChatGPT/AI", "Dropdown tool"])),
                ("would_recommend", AnswerValue::Flag(true)),
            ]),
            sub("b", &[
                ("methods", choices(&["Dropdown tool"])),
                ("would_recommend", AnswerValue::Flag(false)),
            ]),
        ];
        let methods = aggregate(&subs, &FieldGroup::new("methods", &["methods"]));
        assert_eq!(methods.get("Dropdown tool"), 2);
        assert_eq!(methods.get("ChatGPT/AI"), 1);
        let flags = aggregate(&subs, &FieldGroup::new("recommend", &["would_recommend"]));
        assert_eq!(flags.get("true"), 1);
        assert_eq!(flags.get("false"), 1);
    }

    #[test]
    fn test_deduplicate_keeps_first_and_is_idempotent() {
        let schema = SurveySchema::teacher_feedback();
        let same = [("methods", choices(&["Other"])), ("email", text("x@y.z"))];
        let subs = vec![
            sub("first", &same),
            sub("other", &[("methods", choices(&["ChatGPT/AI"]))]),
            sub("second", &same),
        ];

        for policy in [DedupPolicy::ExactFields, DedupPolicy::ContentHash] {
            let once = deduplicate(&schema, subs.clone(), policy);
            let ids: Vec<&str> = once.iter().map(|s| s.submission_id.as_str()).collect();
            assert_eq!(ids, vec!["first", "other"]);
            assert_eq!(deduplicate(&schema, once.clone(), policy), once);
        }
    }

    #[test]
    fn test_policies_disagree_on_edited_choices() {
        let schema = SurveySchema::teacher_feedback();
        let subs = vec![
            sub("a", &[
                ("email", text("x@y.z")),
                ("methods", choices(&["Other"])),
            ]),
            sub("b", &[
                ("email", text("X@Y.Z ")),
                ("methods", choices(&["Dropdown tool"])),
            ]),
        ];
        assert_eq!(deduplicate(&schema, subs.clone(), DedupPolicy::ExactFields).len(), 2);
        assert_eq!(deduplicate(&schema, subs, DedupPolicy::ContentHash).len(), 1);
    }

    #[test]
    fn test_numeric_summary_bounds_and_parsing() {
        let subs = vec![
            sub("a", &[("custom_hours_saved", text("4.5"))]),
            sub("b", &[("custom_hours_saved", text(" 7 "))]),
            sub("c", &[("custom_hours_saved", text("250"))]),
            sub("d", &[("custom_hours_saved", text("lots"))]),
        ];
        let s = numeric_summary(&subs, "custom_hours_saved").unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.min, 4.5);
        assert_eq!(s.max, 7.0);
        assert!((s.mean - 5.75).abs() < 1e-9);
        assert!(numeric_summary(&subs, "time_saved").is_none());
    }

    #[test]
    fn test_report_build_and_render() {
        let schema = SurveySchema::teacher_feedback();
        let raw = vec![
            sub("a", &[
                ("methods", choices(&["Dropdown tool"])),
                ("time_saved", text(CUSTOM_HOURS_OPTION)),
                ("custom_hours_saved", text("6")),
                ("value_comments", text("Really quick and I love it")),
            ]),
            sub("b", &[
                ("methods", choices(&["Dropdown tool"])),
                ("time_saved", text(CUSTOM_HOURS_OPTION)),
                ("custom_hours_saved", text("6")),
                ("value_comments", text("Really quick and I love it")),
            ]),
            sub("c", &[
                ("methods", choices(&["Writing from scratch"])),
                ("time_saved", text("No time saved")),
                ("custom_hours_saved", text("40")),
                ("limitation_comments", text("Too generic")),
            ]),
        ];
        let report = DashboardReport::build(&schema, raw, DedupPolicy::ExactFields);
        assert_eq!(report.raw_rows, 3);
        assert_eq!(report.unique_rows, 2);

        let themes = &report.themes.iter().find(|(f, _)| f == "value_comments").unwrap().1;
        assert_eq!(themes.get("Value"), 1);
        let limits = &report.themes.iter().find(|(f, _)| f == "limitation_comments").unwrap().1;
        assert_eq!(limits.get("Limitation"), 1);
        let mood = &report.sentiment.iter().find(|(f, _)| f == "value_comments").unwrap().1;
        assert_eq!(mood.get("Positive"), 1);

        // Only the custom-hours answer counts; "40" sits on a non-custom row.
        let hours = report.custom_hours.unwrap();
        assert_eq!(hours.count, 1);
        assert_eq!(hours.mean, 6.0);

        let text = report.render();
        assert!(text.starts_with("Responses: 2 unique of 3 recorded (ExactFields deduplication)"));
        assert!(text.contains("[time_saved]"));
        assert!(text.contains("[suggestions themes]\n  (no answers)"));
        assert!(text.contains("n=1 mean=6.0 min=6.0 max=6.0"));
    }

    #[tokio::test]
    async fn test_submit_counts_one_time_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, aggregator, schema) = setup(dir.path());
        let before = aggregator.load().await.unwrap().len();

        let a = answers(&[
            ("methods", choices(&["Dropdown tool"])),
            ("time_saved", text("4+hrs")),
        ]);
        recorder.accept(a).await.unwrap();

        let rows = aggregator.load().await.unwrap();
        assert_eq!(rows.len(), before + 1);
        let counts = aggregate(&rows, schema.group("time_saved").unwrap());
        assert_eq!(counts.get("4+hrs"), 1);
    }

    #[tokio::test]
    async fn test_submit_without_methods_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, aggregator, _) = setup(dir.path());
        recorder.accept(valid_answers()).await.unwrap();

        let a = answers(&[("methods", choices(&[])), ("time_saved", text("4+hrs"))]);
        let err = recorder.accept(a).await.unwrap_err();
        assert!(matches!(err, RecorderError::Validation(_)));
        assert_eq!(aggregator.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_double_submit_counts_once_after_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, aggregator, schema) = setup(dir.path());

        recorder.accept(valid_answers()).await.unwrap();
        recorder.accept(valid_answers()).await.unwrap();

        let raw = aggregator.load().await.unwrap();
        assert_eq!(raw.len(), 2);
        let group = schema.group("time_saved").unwrap();
        assert_eq!(aggregate(&raw, group).get("4+hrs"), 2);

        for policy in [DedupPolicy::ExactFields, DedupPolicy::ContentHash] {
            let unique = deduplicate(&schema, raw.clone(), policy);
            assert_eq!(unique.len(), 1);
            assert_eq!(aggregate(&unique, group).get("4+hrs"), 1);
        }
    }
}

//! Table-driven keyword classification of free-text comments.
//!
//! First match wins over the table's declared order. This is a plain
//! case-insensitive substring check and nothing more.

use super::CategoryCounts;
use crate::survey::types::Submission;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    pub category: String,
    pub keywords: Vec<String>,
}

/// Ordered (category, keywords) pairs plus the category for no match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    pub groups: Vec<KeywordGroup>,
    pub default: String,
}

impl KeywordTable {
    pub fn new(default: &str, groups: Vec<(&str, Vec<&str>)>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|(category, keywords)| KeywordGroup {
                    category: category.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
            default: default.to_string(),
        }
    }

    /// Value / limitation / suggestion buckets for open comments.
    pub fn themes() -> Self {
        Self::new(
            "Uncategorized",
            vec![
                (
                    "Value",
                    vec![
                        "save time",
                        "saved time",
                        "saves time",
                        "quick",
                        "faster",
                        "consistent",
                        "helpful",
                        "useful",
                    ],
                ),
                (
                    "Limitation",
                    vec![
                        "generic",
                        "repetitive",
                        "limited",
                        "not personal",
                        "robotic",
                        "too long",
                        "missing",
                        "inaccurate",
                    ],
                ),
                (
                    "Suggestion",
                    vec![
                        "would be nice",
                        "suggest",
                        "wish",
                        "could add",
                        "should add",
                        "option to",
                    ],
                ),
            ],
        )
    }

    pub fn sentiment() -> Self {
        Self::new(
            "Neutral",
            vec![
                (
                    "Positive",
                    vec!["love", "great", "excellent", "helpful", "easy", "useful", "saved"],
                ),
                (
                    "Negative",
                    vec![
                        "frustrat",
                        "difficult",
                        "confusing",
                        "slow",
                        "annoying",
                        "waste",
                        "hard to",
                    ],
                ),
            ],
        )
    }

    /// Every category in declared order, default last.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .map(|g| g.category.as_str())
            .chain(std::iter::once(self.default.as_str()))
    }
}

/// Category of the first group with a keyword inside `comment`, else the default.
pub fn classify_text<'a>(comment: &str, table: &'a KeywordTable) -> &'a str {
    let comment = comment.to_lowercase();
    table
        .groups
        .iter()
        .find(|group| {
            group
                .keywords
                .iter()
                .filter(|k| !k.is_empty())
                .any(|k| comment.contains(&k.to_lowercase()))
        })
        .map(|group| group.category.as_str())
        .unwrap_or(table.default.as_str())
}

/// Classify every non-blank answer to `key` and count the categories.
pub fn classify_field(submissions: &[Submission], key: &str, table: &KeywordTable) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for comment in submissions
        .iter()
        .filter_map(|s| s.answer(key))
        .filter(|v| !v.is_blank())
    {
        counts.add(classify_text(&comment.to_string(), table));
    }
    counts
}

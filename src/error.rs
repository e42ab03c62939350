use thiserror::Error;

use crate::store::StoreError;
use crate::survey::types::SubmissionId;

/// Answer set rejected before anything was written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one option must be selected for '{field}'")]
    MissingRequired { field: String },

    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    #[error("answer to '{field}' must be {expected}")]
    WrongKind {
        field: String,
        expected: &'static str,
    },
}

/// Best-effort notification failed. Never fails an acceptance.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },

    #[error("notification timed out after {after:?}")]
    TimedOut { after: std::time::Duration },
}

/// Overall failure of `Recorder::accept`.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Write-time guard found the same content already recorded.
    #[error("duplicate of submission {existing}")]
    Duplicate { existing: SubmissionId },

    /// Master store append failed. The submission was not recorded.
    #[error("master store write failed: {0}")]
    Persistence(#[from] StoreError),
}

impl RecorderError {
    /// Whether resubmitting the same answers may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecorderError::Persistence(_))
    }
}

pub mod csv_file;
pub mod kv;
pub mod snapshot;

use async_trait::async_trait;
use thiserror::Error;

use crate::survey::types::Submission;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key-value store error: {0}")]
    Kv(String),

    #[error("store columns do not match the survey (expected {expected:?}, found {found:?})")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("row {row} is corrupt: {reason}")]
    Corrupt { row: usize, reason: String },

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The single authoritative, append-only record of all submissions.
///
/// Invariant: a successful `append` is visible to the next `read_all`, and a
/// failed one leaves no trace of the row.
#[async_trait]
pub trait MasterStore: Send + Sync {
    async fn append(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Every submission, in append order.
    async fn read_all(&self) -> Result<Vec<Submission>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read_all().await?.len())
    }
}

/// Best-effort mirror. A failure here never fails or rolls back an acceptance.
#[async_trait]
pub trait SecondarySink: Send + Sync {
    fn name(&self) -> &str;

    async fn append(&self, submission: &Submission) -> Result<(), StoreError>;
}

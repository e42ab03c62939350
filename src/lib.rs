pub mod commands;
pub mod dashboard;
pub mod error;
pub mod notify;
pub mod recorder;
pub mod state;
pub mod store;
pub mod survey;

pub use dashboard::classify::{classify_text, KeywordTable};
pub use dashboard::{aggregate, deduplicate, Aggregator, CategoryCounts, DedupPolicy};
pub use error::{NotificationError, RecorderError, ValidationError};
pub use recorder::{IdentityStrategy, Receipt, Recorder};
pub use store::{MasterStore, SecondarySink, StoreError};
pub use survey::types::{AnswerValue, Answers, Submission, SubmissionId};
pub use survey::SurveySchema;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{NotificationError, RecorderError};
use crate::notify::Notifier;
use crate::store::{MasterStore, SecondarySink};
use crate::survey::row::format_timestamp;
use crate::survey::types::{Answers, Submission, SubmissionId};
use crate::survey::SurveySchema;

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// How a submission's id is derived. The two are not interchangeable for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityStrategy {
    /// Acceptance time plus contact email. Distinct unless both match to the second.
    #[default]
    TimestampEmail,
    /// The full answer content. Identical answers always get the same id.
    ContentHash,
}

impl IdentityStrategy {
    pub fn submission_id(
        self,
        schema: &SurveySchema,
        timestamp: &DateTime<Utc>,
        answers: &Answers,
    ) -> SubmissionId {
        match self {
            IdentityStrategy::TimestampEmail => {
                let email = answers
                    .get(&schema.contact_field)
                    .and_then(|v| v.as_text())
                    .unwrap_or("")
                    .trim()
                    .to_lowercase();
                SubmissionId::fingerprint(
                    format!("{}|{}", format_timestamp(timestamp), email).as_bytes(),
                )
            }
            IdentityStrategy::ContentHash => {
                SubmissionId::fingerprint(schema.canonical_content(answers).as_bytes())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Failed(String),
}

/// Result of one best-effort side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutcome {
    pub sink: String,
    pub outcome: Outcome,
}

impl SinkOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Confirmation of a recorded submission plus the fate of every mirror.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub submission_id: SubmissionId,
    pub timestamp: DateTime<Utc>,
    pub mirrors: Vec<SinkOutcome>,
    pub notification: Option<SinkOutcome>,
}

impl Receipt {
    /// No mirror or notification failed.
    pub fn is_clean(&self) -> bool {
        self.warnings().is_empty()
    }

    /// Soft warnings to show next to the acceptance confirmation.
    pub fn warnings(&self) -> Vec<String> {
        self.mirrors
            .iter()
            .chain(self.notification.iter())
            .filter_map(|o| match &o.outcome {
                Outcome::Failed(reason) => Some(format!("{} failed: {}", o.sink, reason)),
                Outcome::Written => None,
            })
            .collect()
    }
}

/// Accepts answer sets, stamps them, and appends them to the master store.
pub struct Recorder {
    schema: Arc<SurveySchema>,
    master: Arc<dyn MasterStore>,
    sinks: Vec<Box<dyn SecondarySink>>,
    notifier: Option<Box<dyn Notifier>>,
    notify_timeout: Duration,
    identity: IdentityStrategy,
    reject_duplicates: bool,
    write_lock: Mutex<()>,
}

impl Recorder {
    pub fn new(schema: Arc<SurveySchema>, master: Arc<dyn MasterStore>) -> Self {
        Self {
            schema,
            master,
            sinks: Vec::new(),
            notifier: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            identity: IdentityStrategy::default(),
            reject_duplicates: false,
            write_lock: Mutex::new(()),
        }
    }

    /// Mirrors are written in registration order.
    pub fn with_sink(mut self, sink: impl SecondarySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static, timeout: Duration) -> Self {
        self.notifier = Some(Box::new(notifier));
        self.notify_timeout = timeout;
        self
    }

    pub fn with_identity(mut self, identity: IdentityStrategy) -> Self {
        self.identity = identity;
        self
    }

    /// Refuse answer sets whose content hash is already in the master store.
    pub fn reject_duplicates(mut self, enabled: bool) -> Self {
        self.reject_duplicates = enabled;
        self
    }

    pub fn schema(&self) -> &Arc<SurveySchema> {
        &self.schema
    }

    pub fn master(&self) -> &Arc<dyn MasterStore> {
        &self.master
    }

    /// Record one answer set.
    ///
    /// Only validation, the duplicate guard, and the master append can fail
    /// the call; nothing is written when they do. Mirror and notification
    /// failures are reported in the receipt.
    pub async fn accept(&self, answers: Answers) -> Result<Receipt, RecorderError> {
        if let Err(e) = self.schema.validate(&answers) {
            debug!(error = %e, "submission rejected");
            return Err(e.into());
        }
        let answers = self.schema.normalize(answers);

        let guard = self.write_lock.lock().await;

        if self.reject_duplicates {
            if let Some(existing) = self.find_duplicate(&answers).await? {
                info!(existing = %existing, "duplicate submission refused");
                return Err(RecorderError::Duplicate { existing });
            }
        }

        let timestamp = Utc::now().trunc_subsecs(0);
        let submission_id = self.identity.submission_id(&self.schema, &timestamp, &answers);
        let submission = Submission {
            submission_id,
            timestamp,
            answers,
        };

        if let Err(e) = self.master.append(&submission).await {
            error!(submission_id = %submission.submission_id, error = %e, "master store write failed");
            return Err(e.into());
        }
        drop(guard);

        info!(submission_id = %submission.submission_id, "submission recorded");

        let mut mirrors = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let outcome = match sink.append(&submission).await {
                Ok(()) => Outcome::Written,
                Err(e) => {
                    warn!(
                        sink = sink.name(),
                        submission_id = %submission.submission_id,
                        error = %e,
                        "secondary store write failed"
                    );
                    Outcome::Failed(e.to_string())
                }
            };
            mirrors.push(SinkOutcome {
                sink: sink.name().to_string(),
                outcome,
            });
        }

        let notification = match &self.notifier {
            Some(notifier) => Some(self.dispatch(notifier.as_ref(), &submission).await),
            None => None,
        };

        Ok(Receipt {
            submission_id: submission.submission_id,
            timestamp: submission.timestamp,
            mirrors,
            notification,
        })
    }

    async fn find_duplicate(&self, answers: &Answers) -> Result<Option<SubmissionId>, RecorderError> {
        let Some(hash) = self.schema.content_hash(answers) else {
            return Ok(None);
        };
        let existing = self.master.read_all().await?;
        Ok(existing
            .into_iter()
            .find(|s| self.schema.content_hash(&s.answers).as_deref() == Some(hash.as_str()))
            .map(|s| s.submission_id))
    }

    async fn dispatch(&self, notifier: &dyn Notifier, submission: &Submission) -> SinkOutcome {
        let result = match tokio::time::timeout(self.notify_timeout, notifier.notify(submission)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::TimedOut {
                after: self.notify_timeout,
            }),
        };

        let outcome = match result {
            Ok(()) => {
                debug!(notifier = notifier.name(), submission_id = %submission.submission_id, "notification sent");
                Outcome::Written
            }
            Err(e) => {
                warn!(
                    notifier = notifier.name(),
                    submission_id = %submission.submission_id,
                    error = %e,
                    "notification failed"
                );
                Outcome::Failed(e.to_string())
            }
        };
        SinkOutcome {
            sink: notifier.name().to_string(),
            outcome,
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::error::NotificationError;
use crate::survey::row::format_timestamp;
use crate::survey::types::Submission;
use crate::survey::SurveySchema;

/// Best-effort delivery of a copy of each accepted submission.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, submission: &Submission) -> Result<(), NotificationError>;
}

/// Mail relay payload.
#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Sends submissions to an HTTP mail relay. Credentials come from deployment config.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    to: String,
    api_key: Option<String>,
    schema: Arc<SurveySchema>,
}

impl HttpNotifier {
    pub fn new(
        endpoint: &str,
        to: &str,
        api_key: Option<String>,
        timeout: Duration,
        schema: Arc<SurveySchema>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            to: to.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            schema,
        })
    }

    pub fn message(&self, submission: &Submission) -> MailMessage {
        MailMessage {
            to: self.to.clone(),
            subject: format!("New survey submission {}", submission.submission_id),
            text: render_plain_text(&self.schema, submission),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, submission: &Submission) -> Result<(), NotificationError> {
        let mut req = self.client.post(&self.endpoint).json(&self.message(submission));
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Plain-text rendering: stamps, then `Label: value` per present answer in column order.
pub fn render_plain_text(schema: &SurveySchema, submission: &Submission) -> String {
    let mut out = format!(
        "Submission ID: {}\nSubmitted: {}\n\n",
        submission.submission_id,
        format_timestamp(&submission.timestamp)
    );
    for question in &schema.questions {
        if let Some(value) = submission.answers.get(&question.key) {
            out.push_str(&format!("{}: {}\n", question.label, value));
        }
    }
    out
}

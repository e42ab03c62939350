use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, Level};

use crate::dashboard::Aggregator;
use crate::notify::HttpNotifier;
use crate::recorder::{IdentityStrategy, Recorder, DEFAULT_NOTIFY_TIMEOUT};
use crate::store::csv_file::{CsvMasterStore, DailyCsvSink};
use crate::store::kv::KvMasterStore;
use crate::store::snapshot::JsonSnapshotSink;
use crate::store::MasterStore;
use crate::survey::SurveySchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterBackend {
    Csv,
    Kv,
}

/// Mail relay settings. Present only when a relay URL is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub url: String,
    pub to: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Deployment configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    pub data_dir: PathBuf,
    pub backend: MasterBackend,
    pub daily_backup: bool,
    pub json_snapshot: bool,
    pub identity: IdentityStrategy,
    pub reject_duplicates: bool,
    pub notify: Option<NotifyConfig>,
    pub log_level: Level,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: MasterBackend::Csv,
            daily_backup: true,
            json_snapshot: true,
            identity: IdentityStrategy::TimestampEmail,
            reject_duplicates: false,
            notify: None,
            log_level: Level::INFO,
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got {:?}", key, other),
    }
}

impl RecorderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build from any key lookup; unset and empty values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get("SURVEY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = get("SURVEY_MASTER_BACKEND") {
            config.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "csv" => MasterBackend::Csv,
                "kv" => MasterBackend::Kv,
                other => bail!("SURVEY_MASTER_BACKEND must be csv or kv, got {:?}", other),
            };
        }
        if let Some(raw) = get("SURVEY_DAILY_BACKUP") {
            config.daily_backup = parse_bool("SURVEY_DAILY_BACKUP", &raw)?;
        }
        if let Some(raw) = get("SURVEY_JSON_SNAPSHOT") {
            config.json_snapshot = parse_bool("SURVEY_JSON_SNAPSHOT", &raw)?;
        }
        if let Some(raw) = get("SURVEY_ID_STRATEGY") {
            config.identity = match raw.trim().to_ascii_lowercase().as_str() {
                "timestamp-email" => IdentityStrategy::TimestampEmail,
                "content" => IdentityStrategy::ContentHash,
                other => bail!(
                    "SURVEY_ID_STRATEGY must be timestamp-email or content, got {:?}",
                    other
                ),
            };
        }
        if let Some(raw) = get("SURVEY_REJECT_DUPLICATES") {
            config.reject_duplicates = parse_bool("SURVEY_REJECT_DUPLICATES", &raw)?;
        }
        if let Some(raw) = get("SURVEY_LOG_LEVEL") {
            config.log_level = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("SURVEY_LOG_LEVEL is not a log level: {:?}", raw))?;
        }

        if let Some(url) = get("SURVEY_NOTIFY_URL") {
            let to = get("SURVEY_NOTIFY_TO")
                .context("SURVEY_NOTIFY_TO is required when SURVEY_NOTIFY_URL is set")?;
            let timeout = match get("SURVEY_NOTIFY_TIMEOUT_SECS") {
                Some(raw) => {
                    let secs: u64 = raw.trim().parse().with_context(|| {
                        format!("SURVEY_NOTIFY_TIMEOUT_SECS is not a number: {:?}", raw)
                    })?;
                    if secs == 0 {
                        bail!("SURVEY_NOTIFY_TIMEOUT_SECS must be at least 1");
                    }
                    Duration::from_secs(secs)
                }
                None => DEFAULT_NOTIFY_TIMEOUT,
            };
            config.notify = Some(NotifyConfig {
                url,
                to,
                api_key: get("SURVEY_NOTIFY_API_KEY"),
                timeout,
            });
        }

        Ok(config)
    }
}

pub struct AppState {
    pub schema: Arc<SurveySchema>,
    pub recorder: Recorder,
    pub aggregator: Aggregator,
}

impl AppState {
    /// Open the configured stores and wire the recorder and dashboard reader.
    pub async fn build(config: &RecorderConfig) -> Result<Self> {
        let schema = Arc::new(SurveySchema::teacher_feedback());
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", config.data_dir))?;

        let master: Arc<dyn MasterStore> = match config.backend {
            MasterBackend::Csv => Arc::new(CsvMasterStore::new(&config.data_dir, schema.clone())),
            MasterBackend::Kv => Arc::new(
                KvMasterStore::open(&config.data_dir)
                    .await
                    .context("Failed to open key-value master store")?,
            ),
        };
        info!(backend = ?config.backend, data_dir = ?config.data_dir, "Master store ready");

        let mut recorder = Recorder::new(schema.clone(), master.clone())
            .with_identity(config.identity)
            .reject_duplicates(config.reject_duplicates);
        if config.daily_backup {
            recorder = recorder.with_sink(DailyCsvSink::new(&config.data_dir, schema.clone()));
        }
        if config.json_snapshot {
            recorder = recorder.with_sink(JsonSnapshotSink::new(&config.data_dir));
        }
        if let Some(notify) = &config.notify {
            let notifier = HttpNotifier::new(
                &notify.url,
                &notify.to,
                notify.api_key.clone(),
                notify.timeout,
                schema.clone(),
            )?;
            recorder = recorder.with_notifier(notifier, notify.timeout);
            info!(to = %notify.to, "Email notification enabled");
        }

        Ok(Self {
            schema,
            recorder,
            aggregator: Aggregator::new(master),
        })
    }
}

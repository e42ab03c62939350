use std::path::Path;

use async_trait::async_trait;
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{MasterStore, StoreError};
use crate::survey::types::Submission;

pub const KV_DIR: &str = "kv";

// Key layout (no trailing slashes on the prefix, cnidarium convention)
const SURVEY_PREFIX: &str = "survey";
const ROW_PREFIX: &str = "survey/row/";
const SEQ_KEY: &str = "survey/seq";

fn row_key(seq: u64) -> String {
    format!("{}{:020}", ROW_PREFIX, seq)
}

fn kv_error(context: &'static str) -> impl FnOnce(anyhow::Error) -> StoreError {
    move |e| StoreError::Kv(format!("{}: {}", context, e))
}

/// Master store on an embedded key-value database.
///
/// Each append commits the row and the bumped sequence counter in one delta.
pub struct KvMasterStore {
    storage: Storage,
    write_lock: Mutex<()>,
}

impl KvMasterStore {
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let dir = data_dir.join(KV_DIR);
        std::fs::create_dir_all(&dir)?;
        let storage = Storage::load(dir, vec![SURVEY_PREFIX.to_string()])
            .await
            .map_err(kv_error("failed to open storage"))?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
        })
    }
}

fn decode_seq(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Kv(format!("sequence counter has {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

#[async_trait]
impl MasterStore for KvMasterStore {
    async fn append(&self, submission: &Submission) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let seq = match snapshot
            .get_raw(SEQ_KEY)
            .await
            .map_err(kv_error("failed to read sequence"))?
        {
            Some(bytes) => decode_seq(&bytes)?,
            None => 0,
        };

        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(row_key(seq), serde_json::to_vec(submission)?);
        delta.put_raw(SEQ_KEY.to_string(), (seq + 1).to_be_bytes().to_vec());
        self.storage
            .commit(delta)
            .await
            .map_err(kv_error("failed to commit row"))?;

        debug!(submission_id = %submission.submission_id, seq, "master row committed");
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Submission>, StoreError> {
        let snapshot = self.storage.latest_snapshot();
        let mut stream = snapshot.prefix_raw(ROW_PREFIX);
        let mut rows = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => rows.push((key, value)),
                Err(e) => {
                    warn!("Error reading survey rows: {}", e);
                    return Err(StoreError::Kv(format!("failed to scan rows: {}", e)));
                }
            }
        }

        // Zero-padded sequence keys sort in append order.
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows.iter()
            .enumerate()
            .map(|(i, (_, value))| {
                serde_json::from_slice(value).map_err(|e| StoreError::Corrupt {
                    row: i + 1,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let snapshot = self.storage.latest_snapshot();
        match snapshot
            .get_raw(SEQ_KEY)
            .await
            .map_err(kv_error("failed to read sequence"))?
        {
            Some(bytes) => Ok(decode_seq(&bytes)? as usize),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::tests::{answers, choices, text};
    use crate::survey::types::SubmissionId;
    use chrono::{TimeZone, Utc};

    fn submission(id: &str, minute: u32) -> Submission {
        Submission {
            submission_id: SubmissionId::from_stored(id),
            timestamp: Utc.with_ymd_and_hms(2026, 6, 30, 9, minute, 0).unwrap(),
            answers: answers(&[
                ("methods", choices(&["ChatGPT/AI"])),
                ("time_saved", text("1-2hrs")),
            ]),
        }
    }

    #[test]
    fn test_row_keys_sort_numerically() {
        assert!(row_key(9) < row_key(10));
        assert!(row_key(99) < row_key(100));
    }

    #[test]
    fn test_decode_seq_rejects_short_value() {
        assert!(decode_seq(&[1, 2, 3]).is_err());
        assert_eq!(decode_seq(&7u64.to_be_bytes()).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_append_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvMasterStore::open(dir.path()).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);

        let subs: Vec<Submission> = (0..12)
            .map(|i| submission(&format!("{:012}", i), i))
            .collect();
        for s in &subs {
            store.append(s).await.unwrap();
        }

        assert_eq!(store.len().await.unwrap(), 12);
        assert_eq!(store.read_all().await.unwrap(), subs);
    }

    #[tokio::test]
    async fn test_recorder_round_trip_keeps_value_shapes() {
        use crate::recorder::Recorder;
        use crate::survey::types::AnswerValue;
        use crate::survey::SurveySchema;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let master = Arc::new(KvMasterStore::open(dir.path()).await.unwrap());
        let recorder = Recorder::new(Arc::new(SurveySchema::teacher_feedback()), master.clone());

        let input = answers(&[
            ("methods", choices(&["ChatGPT/AI", "Dropdown tool", "Other"])),
            ("would_recommend", AnswerValue::Flag(false)),
            ("suggestions", text("  ")),
        ]);
        let receipt = recorder.accept(input.clone()).await.unwrap();

        let rows = master.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].submission_id, receipt.submission_id);
        assert_eq!(rows[0].timestamp, receipt.timestamp);
        assert_eq!(rows[0].answers, input);
    }
}

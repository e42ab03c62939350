use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{SecondarySink, StoreError};
use crate::survey::row::{format_timestamp, ID_COLUMN, TIMESTAMP_COLUMN};
use crate::survey::types::Submission;

pub const SNAPSHOT_DIR: &str = "snapshots";

/// One JSON document per submission, same fields as the master row.
pub struct JsonSnapshotSink {
    dir: PathBuf,
}

impl JsonSnapshotSink {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(SNAPSHOT_DIR),
        }
    }

    /// File for the given copy of a submission. Copy 1 carries no suffix;
    /// later copies of the same id and second get `_2`, `_3`, ...
    pub fn snapshot_path(&self, submission: &Submission, copy: u32) -> PathBuf {
        numbered(&self.dir, &snapshot_stem(submission), copy)
    }
}

fn snapshot_stem(submission: &Submission) -> String {
    format!(
        "submission_{}_{}",
        submission.timestamp.format("%Y%m%d_%H%M%S"),
        submission.submission_id
    )
}

fn numbered(dir: &Path, stem: &str, copy: u32) -> PathBuf {
    match copy {
        0 | 1 => dir.join(format!("{}.json", stem)),
        n => dir.join(format!("{}_{}.json", stem, n)),
    }
}

/// Flat key/value document: stamps plus every present answer.
pub fn snapshot_document(submission: &Submission) -> Result<Value, StoreError> {
    let mut doc = Map::new();
    doc.insert(
        TIMESTAMP_COLUMN.to_string(),
        Value::String(format_timestamp(&submission.timestamp)),
    );
    doc.insert(
        ID_COLUMN.to_string(),
        Value::String(submission.submission_id.to_string()),
    );
    for (key, value) in &submission.answers {
        doc.insert(key.clone(), serde_json::to_value(value)?);
    }
    Ok(Value::Object(doc))
}

#[async_trait]
impl SecondarySink for JsonSnapshotSink {
    fn name(&self) -> &str {
        "json-snapshot"
    }

    async fn append(&self, submission: &Submission) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&snapshot_document(submission)?)?;
        let dir = self.dir.clone();
        let stem = snapshot_stem(submission);
        let path = tokio::task::spawn_blocking(move || write_new(&dir, &stem, &bytes)).await??;
        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }
}

/// Write into a synced temp file in `dir`, then move it to the first free
/// numbered name for `stem`. Existing snapshots are never replaced.
fn write_new(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    let mut copy = 1;
    loop {
        let path = numbered(dir, stem, copy);
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                tmp = e.file;
                copy += 1;
            }
            Err(e) => return Err(e.error.into()),
        }
    }
}

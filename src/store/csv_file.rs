use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{MasterStore, SecondarySink, StoreError};
use crate::survey::row;
use crate::survey::types::Submission;
use crate::survey::SurveySchema;

pub const MASTER_FILE: &str = "survey_responses.csv";
pub const BACKUP_DIR: &str = "backups";

/// Append-only CSV master. One writer at a time; each row lands whole or not at all.
pub struct CsvMasterStore {
    path: PathBuf,
    schema: Arc<SurveySchema>,
    lock: Mutex<()>,
}

impl CsvMasterStore {
    pub fn new(data_dir: &Path, schema: Arc<SurveySchema>) -> Self {
        Self::at(data_dir.join(MASTER_FILE), schema)
    }

    pub fn at(path: PathBuf, schema: Arc<SurveySchema>) -> Self {
        Self {
            path,
            schema,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MasterStore for CsvMasterStore {
    async fn append(&self, submission: &Submission) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let header = row::header(&self.schema);
        let cells = row::encode(&self.schema, submission);

        tokio::task::spawn_blocking(move || append_row(&path, &header, &cells)).await??;

        debug!(
            submission_id = %submission.submission_id,
            path = %self.path.display(),
            "master row appended"
        );
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Submission>, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let schema = self.schema.clone();
        tokio::task::spawn_blocking(move || read_rows(&path, &schema)).await?
    }
}

/// Date-partitioned mirror: one CSV per UTC day, same columns as the master.
pub struct DailyCsvSink {
    dir: PathBuf,
    schema: Arc<SurveySchema>,
    lock: Mutex<()>,
}

impl DailyCsvSink {
    pub fn new(data_dir: &Path, schema: Arc<SurveySchema>) -> Self {
        Self {
            dir: data_dir.join(BACKUP_DIR),
            schema,
            lock: Mutex::new(()),
        }
    }

    /// File holding every submission accepted on the submission's UTC date.
    pub fn partition_path(&self, submission: &Submission) -> PathBuf {
        self.dir.join(format!(
            "survey_backup_{}.csv",
            submission.timestamp.format("%Y%m%d")
        ))
    }
}

#[async_trait]
impl SecondarySink for DailyCsvSink {
    fn name(&self) -> &str {
        "daily-backup"
    }

    async fn append(&self, submission: &Submission) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.partition_path(submission);
        let header = row::header(&self.schema);
        let cells = row::encode(&self.schema, submission);
        tokio::task::spawn_blocking(move || append_row(&path, &header, &cells)).await?
    }
}

/// Append one encoded row, writing the header first if the file is new or empty.
///
/// The whole sequence runs under an exclusive OS lock on the file, so separate
/// processes appending to the same path take turns. The row is encoded in
/// memory and written with a single `write_all`. If the write or sync fails,
/// the file is truncated back to its previous length.
pub(crate) fn append_row(path: &Path, header: &[String], cells: &[String]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let result = append_locked(&mut file, path, header, cells);
    let _ = file.unlock();
    result
}

fn append_locked(
    file: &mut fs::File,
    path: &Path,
    header: &[String],
    cells: &[String],
) -> Result<(), StoreError> {
    let start = file.metadata()?.len();

    if start > 0 {
        let mut reader = csv::Reader::from_path(path)?;
        let found = reader.headers()?;
        if !found.iter().eq(header.iter().map(String::as_str)) {
            return Err(StoreError::HeaderMismatch {
                expected: header.to_vec(),
                found: found.iter().map(str::to_string).collect(),
            });
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if start == 0 {
        writer.write_record(header)?;
    }
    writer.write_record(cells)?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;

    if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_data()) {
        let _ = file.set_len(start);
        return Err(e.into());
    }
    Ok(())
}

fn read_rows(path: &Path, schema: &SurveySchema) -> Result<Vec<Submission>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    // Shared lock: never observe a row another process is halfway through.
    file.lock_shared()?;
    let rows = decode_rows(&file, schema);
    let _ = file.unlock();
    rows
}

fn decode_rows(file: &fs::File, schema: &SurveySchema) -> Result<Vec<Submission>, StoreError> {
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_reader(file);
    row::check_header(schema, reader.headers()?)?;

    reader
        .records()
        .enumerate()
        .map(|(i, record)| row::decode(schema, &record?, i + 1))
        .collect()
}

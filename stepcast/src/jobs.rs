//! Job status records for background forecasts
//!
//! A job moves from `pending` to either `done` (with a result) or `failed`
//! (with an error message). Writers replace the whole record; readers poll.

use crate::engine::ForecastOutput;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, not finished yet
    Pending,
    /// Finished with a result
    Done,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Whether the job has finished
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Persisted state of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Where the job is in its lifecycle
    pub status: JobStatus,
    /// Request description written with the pending record
    #[serde(default)]
    pub meta: Value,
    /// Forecast output once done
    pub result: Option<ForecastOutput>,
    /// Error message once failed
    pub error: Option<String>,
}

impl JobRecord {
    /// Fresh pending record
    pub fn pending(meta: Value) -> Self {
        Self {
            status: JobStatus::Pending,
            meta,
            result: None,
            error: None,
        }
    }

    /// Completed record
    pub fn done(meta: Value, result: ForecastOutput) -> Self {
        Self {
            status: JobStatus::Done,
            meta,
            result: Some(result),
            error: None,
        }
    }

    /// Failed record
    pub fn failed(meta: Value, error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            meta,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Storage for job records
pub trait JobStore: Send + Sync {
    /// Write a pending record
    fn write_pending(&self, job_id: &str, meta: Value) -> Result<()>;

    /// Mark a job done, keeping its meta
    fn write_result(&self, job_id: &str, result: ForecastOutput) -> Result<()>;

    /// Mark a job failed, keeping its meta
    fn write_error(&self, job_id: &str, error: &str) -> Result<()>;

    /// Current record, `None` for an unknown job
    fn read(&self, job_id: &str) -> Result<Option<JobRecord>>;
}

fn validate_job_id(job_id: &str) -> Result<()> {
    let valid = !job_id.is_empty()
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ForecastError::JobError(format!("Invalid job id '{}'", job_id)))
    }
}

/// One `<job_id>.json` file per job
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Store rooted at `dir`, created on first write
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the job files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, job_id: &str) -> Result<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.dir.join(format!("{}.json", job_id)))
    }

    fn write(&self, job_id: &str, record: &JobRecord) -> Result<()> {
        let path = self.path(job_id)?;
        fs::create_dir_all(&self.dir)?;

        // Write then rename so pollers never see a partial file
        let tmp = self.dir.join(format!(".{}.json.tmp", job_id));
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn meta(&self, job_id: &str) -> Value {
        self.read(job_id)
            .ok()
            .flatten()
            .map(|r| r.meta)
            .unwrap_or(Value::Null)
    }
}

impl JobStore for FileJobStore {
    fn write_pending(&self, job_id: &str, meta: Value) -> Result<()> {
        self.write(job_id, &JobRecord::pending(meta))
    }

    fn write_result(&self, job_id: &str, result: ForecastOutput) -> Result<()> {
        let meta = self.meta(job_id);
        self.write(job_id, &JobRecord::done(meta, result))
    }

    fn write_error(&self, job_id: &str, error: &str) -> Result<()> {
        let meta = self.meta(job_id);
        self.write(job_id, &JobRecord::failed(meta, error))
    }

    fn read(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let path = self.path(job_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Records kept in memory
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, job_id: &str, make: impl FnOnce(Value) -> JobRecord) -> Result<()> {
        validate_job_id(job_id)?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let meta = records
            .remove(job_id)
            .map(|r| r.meta)
            .unwrap_or(Value::Null);
        records.insert(job_id.to_string(), make(meta));
        Ok(())
    }
}

impl JobStore for MemoryJobStore {
    fn write_pending(&self, job_id: &str, meta: Value) -> Result<()> {
        self.update(job_id, |_| JobRecord::pending(meta))
    }

    fn write_result(&self, job_id: &str, result: ForecastOutput) -> Result<()> {
        self.update(job_id, |meta| JobRecord::done(meta, result))
    }

    fn write_error(&self, job_id: &str, error: &str) -> Result<()> {
        self.update(job_id, |meta| JobRecord::failed(meta, error))
    }

    fn read(&self, job_id: &str) -> Result<Option<JobRecord>> {
        validate_job_id(job_id)?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned())
    }
}

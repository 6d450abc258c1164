//! Job record store: an in-memory map with write-through JSON persistence.
//!
//! Every mutation rewrites the job's file under the jobs directory, so
//! restarts can reload history. Jobs that were mid-flight when the process
//! died are swept to failed on open since their worker tasks are gone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::job::{unix_timestamp, JobRecord, JobStatus};

pub struct JobStore {
    records: RwLock<HashMap<String, JobRecord>>,
    dir: Option<PathBuf>,
}

impl JobStore {
    /// Volatile store, for tests and embedded use.
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Open a persistent store, loading any records a previous process left
    /// behind. Unreadable record files are skipped with a warning.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::JobStore(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let mut records = HashMap::new();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::JobStore(format!("Failed to read {}: {e}", dir.display()))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable job record");
                    continue;
                }
            };
            let mut record: JobRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping corrupt job record");
                    continue;
                }
            };

            if !record.status.is_terminal() {
                record.status = JobStatus::Failed;
                record.error = Some("Interrupted by server restart".to_string());
                record.updated_at = unix_timestamp();
                write_record(dir, &record)?;
            }
            records.insert(record.id.clone(), record);
        }
        debug!(count = records.len(), dir = %dir.display(), "loaded job records");

        Ok(Self {
            records: RwLock::new(records),
            dir: Some(dir.to_path_buf()),
        })
    }

    pub async fn create(&self) -> Result<JobRecord> {
        let record = JobRecord::new();
        let mut records = self.records.write().await;
        self.persist(&record)?;
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn transition(&self, id: &str, next: JobStatus) -> Result<JobRecord> {
        self.update(id, |record| {
            if !record.status.can_transition_to(next) {
                return Err(Error::JobStore(format!(
                    "Illegal status transition: {} -> {next}",
                    record.status
                )));
            }
            record.status = next;
            Ok(())
        })
        .await
    }

    /// Progress only moves forward; late or duplicate reports are clamped
    /// into the record's current value.
    pub async fn set_progress(&self, id: &str, progress: u8) -> Result<JobRecord> {
        self.update(id, |record| {
            if !record.status.is_terminal() {
                record.progress = record.progress.max(progress.min(100));
            }
            Ok(())
        })
        .await
    }

    pub async fn complete(&self, id: &str, audio_url: String) -> Result<JobRecord> {
        self.update(id, |record| {
            if !record.status.can_transition_to(JobStatus::Completed) {
                return Err(Error::JobStore(format!(
                    "Illegal status transition: {} -> completed",
                    record.status
                )));
            }
            record.status = JobStatus::Completed;
            record.progress = 100;
            record.audio_url = Some(audio_url);
            Ok(())
        })
        .await
    }

    /// Mark a job failed. Safe to call on an already terminal job, which
    /// stays as it is.
    pub async fn fail(&self, id: &str, message: &str) -> Result<JobRecord> {
        {
            let records = self.records.read().await;
            if let Some(record) = records.get(id) {
                if record.status.is_terminal() {
                    return Ok(record.clone());
                }
            }
        }
        let message = message.to_string();
        self.update(id, move |record| {
            if !record.status.is_terminal() {
                record.status = JobStatus::Failed;
                record.error = Some(message);
            }
            Ok(())
        })
        .await
    }

    async fn update<F>(&self, id: &str, apply: F) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> Result<()>,
    {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::JobStore(format!("Unknown job: {id}")))?;
        apply(record)?;
        record.updated_at = unix_timestamp();
        let snapshot = record.clone();
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    fn persist(&self, record: &JobRecord) -> Result<()> {
        match &self.dir {
            Some(dir) => write_record(dir, record),
            None => Ok(()),
        }
    }
}

fn write_record(dir: &Path, record: &JobRecord) -> Result<()> {
    let path = dir.join(format!("{}.json", record.id));
    let body = serde_json::to_string_pretty(record)
        .map_err(|e| Error::JobStore(format!("Failed to encode job record: {e}")))?;
    std::fs::write(&path, body).map_err(|e| {
        Error::JobStore(format!("Failed to write {}: {e}", path.display()))
    })
}

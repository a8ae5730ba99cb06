//! Append-only processing record log (JSON lines).
//!
//! Single writer: the batch orchestrator. Each record is serialized to one
//! line and written with a single `write_all` on a file opened in append
//! mode.

use blackout_core::{ProcessingRecord, Status};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("record log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub fn append(&self, record: &ProcessingRecord) -> Result<(), AuditError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Every record in append order. Lines that do not parse are skipped.
    pub fn history(&self) -> Result<Vec<ProcessingRecord>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let mut records = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!(
                    "[Batch] skipping malformed record at {}:{}: {}",
                    self.path.display(),
                    number + 1,
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Latest record per input file for one (input, output) collection pair.
    pub fn latest_by_file(
        &self,
        input_stage: &str,
        output_stage: &str,
    ) -> Result<HashMap<String, ProcessingRecord>, AuditError> {
        let mut latest = HashMap::new();
        for record in self.history()? {
            if record.input_stage == input_stage && record.output_stage == output_stage {
                latest.insert(record.input_file.clone(), record);
            }
        }
        Ok(latest)
    }

    /// Files whose latest attempt for the collection pair completed.
    pub fn completed_files(
        &self,
        input_stage: &str,
        output_stage: &str,
    ) -> Result<HashSet<String>, AuditError> {
        Ok(self
            .latest_by_file(input_stage, output_stage)?
            .into_iter()
            .filter(|(_, record)| record.status == Status::Completed)
            .map(|(file, _)| file)
            .collect())
    }
}

//! Batch orchestration over one file or a whole collection.
//!
//! Files run strictly one after another in discovery order. Each record is
//! appended to the log as soon as its file finishes, so the log is the
//! checkpoint if a run is interrupted.

use crate::audit::{AuditError, RecordLog};
use crate::config::AppConfig;
use crate::pipeline::{FileJob, FileProcessor};
use blackout_core::{BlobStage, Status};
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

/// Work-set selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Every file in the input collection with the document extension.
    Bulk,
    /// Exactly the named file.
    Single(String),
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub input: String,
    pub output: String,
    pub invocation: Invocation,
    /// Drop files whose latest record for this collection pair completed.
    pub skip_completed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to list collection {collection:?}: {message}")]
    Discovery { collection: String, message: String },
    #[error("record log unavailable, run aborted: {0}")]
    Log(#[from] AuditError),
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub run_id: String,
    /// Files in the work set before `--skip-completed` filtering.
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Percentage of processed files that completed; 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        match self.processed() {
            0 => 0.0,
            n => self.succeeded as f64 * 100.0 / n as f64,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: {} found, {} succeeded, {} failed",
            self.run_id, self.found, self.succeeded, self.failed
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        write!(
            f,
            " ({:.1}% success) in {:.1}s",
            self.success_rate(),
            self.elapsed.as_secs_f64()
        )
    }
}

fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

fn file_name(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

pub struct BatchOrchestrator<'a> {
    processor: FileProcessor<'a>,
    stage: &'a dyn BlobStage,
    log: &'a RecordLog,
    config: &'a AppConfig,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        processor: FileProcessor<'a>,
        stage: &'a dyn BlobStage,
        log: &'a RecordLog,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            processor,
            stage,
            log,
            config,
        }
    }

    /// Lists the work set at call time.
    ///
    /// Bulk mode keeps files with the configured extension (case-insensitive).
    /// When input and output are the same collection, files already carrying
    /// the output prefix are left out so outputs are not redacted again.
    pub fn discover(&self, request: &BatchRequest) -> Result<Vec<String>, BatchError> {
        let name = match &request.invocation {
            Invocation::Single(name) => return Ok(vec![name.clone()]),
            Invocation::Bulk => &request.input,
        };

        let listed = self
            .stage
            .list(name)
            .map_err(|e| BatchError::Discovery {
                collection: name.clone(),
                message: format!("{e:#}"),
            })?;
        let extension = self.config.extension();
        let prefix = &self.config.pipeline.output_prefix;
        let same_collection = request.input == request.output;

        let files: Vec<String> = listed
            .into_iter()
            .filter(|id| {
                Path::new(id)
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            })
            .filter(|id| !(same_collection && file_name(id).starts_with(prefix.as_str())))
            .collect();

        log::info!(
            "[Batch] {} {} files in {:?}",
            files.len(),
            extension,
            request.input
        );
        Ok(files)
    }

    /// Runs the work set. Only a record-log failure stops the run early; a
    /// failing file is recorded and the next one is attempted.
    pub fn run(&self, request: &BatchRequest) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let run_id = new_run_id();

        let mut files = self.discover(request)?;
        let found = files.len();
        let mut skipped = 0;
        if request.skip_completed && request.invocation == Invocation::Bulk {
            let done = self.log.completed_files(&request.input, &request.output)?;
            files.retain(|file| !done.contains(file));
            skipped = found - files.len();
            if skipped > 0 {
                log::info!("[Batch] skipping {} already completed files", skipped);
            }
        }

        let mut summary = BatchSummary {
            run_id: run_id.clone(),
            found,
            succeeded: 0,
            failed: 0,
            skipped,
            elapsed: Duration::ZERO,
        };

        let total = files.len();
        for (position, file) in files.iter().enumerate() {
            log::info!("[Batch] ({}/{}) {}", position + 1, total, file);
            let record = self.processor.process(&FileJob {
                run_id: &run_id,
                file,
                input: &request.input,
                output: &request.output,
            });
            self.log.append(&record)?;

            match record.status {
                Status::Completed => summary.succeeded += 1,
                _ => summary.failed += 1,
            }
        }

        summary.elapsed = started.elapsed();
        log::info!("[Batch] {}", summary);
        Ok(summary)
    }
}

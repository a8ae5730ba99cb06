//! Append-only processing records.
//!
//! One record per (input file, attempt). A record is built in memory while a
//! file is in flight and persisted once, with its terminal status; retries
//! produce new records instead of rewriting old ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `SUBMITTED -> COMPLETED | FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Submitted,
    Completed,
    Failed,
}

/// Pipeline step at which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStep {
    Fetch,
    Extract,
    Detect,
    Redact,
    Persist,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub run_id: String,
    pub input_file: String,
    pub input_stage: String,
    pub output_stage: String,
    pub output_file: Option<String>,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    pub text_length: usize,
    pub pii_found_count: usize,
    pub redactions_made: usize,
    pub duration_ms: u64,
    pub input_sha256: Option<String>,
    pub failed_step: Option<FailedStep>,
    pub error_message: Option<String>,
    pub warnings: Option<Vec<String>>,
}

impl ProcessingRecord {
    pub fn submitted(
        run_id: impl Into<String>,
        input_file: impl Into<String>,
        input_stage: impl Into<String>,
        output_stage: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            input_file: input_file.into(),
            input_stage: input_stage.into(),
            output_stage: output_stage.into(),
            output_file: None,
            status: Status::Submitted,
            timestamp: Utc::now(),
            text_length: 0,
            pii_found_count: 0,
            redactions_made: 0,
            duration_ms: 0,
            input_sha256: None,
            failed_step: None,
            error_message: None,
            warnings: None,
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.get_or_insert_with(Vec::new).push(warning.into());
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.as_ref().map_or(0, Vec::len)
    }

    pub fn complete(mut self, elapsed: Duration) -> Self {
        self.status = Status::Completed;
        self.duration_ms = elapsed.as_millis() as u64;
        self.timestamp = Utc::now();
        self
    }

    pub fn fail(mut self, step: FailedStep, message: impl Into<String>, elapsed: Duration) -> Self {
        self.status = Status::Failed;
        self.failed_step = Some(step);
        self.error_message = Some(message.into());
        self.duration_ms = elapsed.as_millis() as u64;
        self.timestamp = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&Status::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::to_string(&Status::Submitted).unwrap(),
            "\"SUBMITTED\""
        );
    }

    #[test]
    fn test_transitions() {
        let rec = ProcessingRecord::submitted("run", "a.pdf", "in", "out");
        assert_eq!(rec.status, Status::Submitted);

        let done = rec.clone().complete(Duration::from_millis(1500));
        assert_eq!(done.status, Status::Completed);
        assert_eq!(done.duration_ms, 1500);
        assert!(done.error_message.is_none());

        let failed = rec.fail(FailedStep::Extract, "boom", Duration::from_millis(3));
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.failed_step, Some(FailedStep::Extract));
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_warnings_are_null_until_pushed() {
        let mut rec = ProcessingRecord::submitted("run", "a.pdf", "in", "out");
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json["warnings"].is_null());
        assert!(json["error_message"].is_null());

        rec.push_warning("near-empty text");
        assert_eq!(rec.warning_count(), 1);
    }
}

//! Per-file processing: fetch, extract, detect, resolve, redact, persist.
//!
//! Every failure is caught here and turned into a FAILED record; nothing
//! escapes to the batch loop.

use crate::config::{AppConfig, DetectionScope};
use blackout_core::{
    output_name, BlobStage, Document, DocumentParser, FailedStep, PageText, PiiDetector,
    PiiInstance, ProcessingRecord, SourceKey,
};
use blackout_pdf::{apply_redactions, ApplyOptions};
use blackout_text::{PageIndexes, SpanResolver};
use blackout_verify::verify_output;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TEXT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read input: {0}")]
    Fetch(String),
    #[error("unreadable document: {0}")]
    Unreadable(String),
    #[error("text extraction timed out after {0}s")]
    ExtractionTimeout(u64),
    #[error("PII detection failed: {0}")]
    Detection(String),
    #[error("redaction failed: {0}")]
    Redaction(String),
    #[error("failed to write output: {0}")]
    Persist(String),
    #[error("internal error: {0}")]
    Panic(String),
}

impl PipelineError {
    pub fn step(&self) -> FailedStep {
        match self {
            PipelineError::Fetch(_) => FailedStep::Fetch,
            PipelineError::Unreadable(_) | PipelineError::ExtractionTimeout(_) => {
                FailedStep::Extract
            }
            PipelineError::Detection(_) => FailedStep::Detect,
            PipelineError::Redaction(_) => FailedStep::Redact,
            PipelineError::Persist(_) => FailedStep::Persist,
            PipelineError::Panic(_) => FailedStep::Internal,
        }
    }
}

/// One unit of work for the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FileJob<'a> {
    pub run_id: &'a str,
    pub file: &'a str,
    pub input: &'a str,
    pub output: &'a str,
}

fn should_log_full_text() -> bool {
    match std::env::var("BLACKOUT_LOG_FULL_TEXT") {
        Ok(val) => {
            let val = val.to_ascii_lowercase();
            val == "1" || val == "true" || val == "yes"
        }
        Err(_) => false,
    }
}

/// At most `max` characters of `text`, cut on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct FileProcessor<'a> {
    parser: Arc<dyn DocumentParser>,
    detector: &'a dyn PiiDetector,
    stage: &'a dyn BlobStage,
    config: &'a AppConfig,
}

impl<'a> FileProcessor<'a> {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        detector: &'a dyn PiiDetector,
        stage: &'a dyn BlobStage,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            parser,
            detector,
            stage,
            config,
        }
    }

    /// Processes one file and returns its terminal record. Never panics and
    /// never returns an error: failures are carried by the record.
    pub fn process(&self, job: &FileJob) -> ProcessingRecord {
        let started = Instant::now();
        let mut record = ProcessingRecord::submitted(job.run_id, job.file, job.input, job.output);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(job, &mut record)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(PipelineError::Panic(panic_message(payload.as_ref()))),
        };

        match result {
            Ok(()) => {
                let record = record.complete(started.elapsed());
                log::info!(
                    "[Pipeline] {} completed: {} PII found, {} regions applied, {} warnings ({} ms)",
                    job.file,
                    record.pii_found_count,
                    record.redactions_made,
                    record.warning_count(),
                    record.duration_ms
                );
                record
            }
            Err(e) => {
                log::error!("[Pipeline] {} failed at {:?}: {}", job.file, e.step(), e);
                record.fail(e.step(), e.to_string(), started.elapsed())
            }
        }
    }

    fn run(&self, job: &FileJob, record: &mut ProcessingRecord) -> Result<(), PipelineError> {
        let bytes = self
            .stage
            .read(job.input, job.file)
            .map_err(|e| PipelineError::Fetch(format!("{e:#}")))?;
        record.input_sha256 = Some(hex::encode(Sha256::digest(&bytes)));
        log::debug!("[Pipeline] {}: {} bytes fetched", job.file, bytes.len());

        let pages = self.extract(&bytes)?;
        let document = Document::new(SourceKey::new(job.input, job.file), bytes, pages);
        record.text_length = document.text_len();
        self.log_text(&document);

        let min_chars = self.config.pipeline.min_text_chars;
        if record.text_length < min_chars {
            log::warn!(
                "[Pipeline] {}: only {} characters extracted",
                job.file,
                record.text_length
            );
            record.push_warning(format!(
                "near-empty extracted text: {} characters (minimum {})",
                record.text_length, min_chars
            ));
        }

        let instances = self.detect(&document, record)?;
        record.pii_found_count = instances.len();

        let indexes = PageIndexes::new(&document, self.config.resolver.index.clone());
        let resolver = SpanResolver::new(&indexes, &self.config.resolver);
        let resolution = resolver.resolve_all(&instances);
        for warning in &resolution.warnings {
            record.push_warning(warning.clone());
        }
        if resolution.unresolved_count > 0 {
            if !document.is_machine_readable() {
                record.push_warning(format!(
                    "document is not machine-readable: {} PII instances could not be located",
                    resolution.unresolved_count
                ));
            } else {
                let image_pages = document.image_only_pages();
                if !image_pages.is_empty() {
                    record.push_warning(format!(
                        "pages without a text layer were not searched: {:?}",
                        image_pages
                    ));
                }
            }
        }

        let options = ApplyOptions {
            clean_metadata: self.config.redaction.clean_metadata,
        };
        let redacted = apply_redactions(&document, &resolution.regions, &options)
            .map_err(|e| PipelineError::Redaction(e.to_string()))?;
        record.redactions_made = redacted.applied;
        for warning in redacted.warnings {
            record.push_warning(warning);
        }

        if self.config.redaction.verify_output && !resolution.resolved.is_empty() {
            let check = verify_output(
                &redacted.bytes,
                &resolution.resolved,
                &self.config.resolver.index,
            );
            for warning in check.warnings {
                record.push_warning(warning);
            }
        }

        let output_file = output_name(&self.config.pipeline.output_prefix, job.file)
            .map_err(|e| PipelineError::Persist(e.to_string()))?;
        self.stage
            .write(job.output, &output_file, &redacted.bytes)
            .map_err(|e| PipelineError::Persist(format!("{e:#}")))?;
        log::debug!("[Pipeline] {} -> {}/{}", job.file, job.output, output_file);
        record.output_file = Some(output_file);
        Ok(())
    }

    /// Runs the parser on a worker thread bounded by the extraction timeout.
    /// A timed-out worker is abandoned; its result, if any, is dropped.
    fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>, PipelineError> {
        let secs = self.config.pipeline.extraction_timeout_secs;
        let parser = Arc::clone(&self.parser);
        let input = bytes.to_vec();
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("blackout-extract".to_string())
            .spawn(move || {
                let _ = tx.send(parser.parse(&input));
            })
            .map_err(|e| PipelineError::Unreadable(format!("could not start extraction: {e}")))?;

        match rx.recv_timeout(Duration::from_secs(secs)) {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(PipelineError::Unreadable(format!("{e:#}"))),
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::ExtractionTimeout(secs)),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Unreadable(format!(
                "{} parser stopped without a result",
                self.parser.name()
            ))),
        }
    }

    fn log_text(&self, document: &Document) {
        if should_log_full_text() {
            log::debug!(
                "[Pipeline] {} extracted text:\n{}",
                document.key(),
                document.full_text()
            );
        } else {
            let text = document.full_text();
            log::debug!(
                "[Pipeline] {}: {} pages, text preview: {:?}",
                document.key(),
                document.page_count(),
                truncate_chars(&text, TEXT_PREVIEW_CHARS)
            );
        }
    }

    fn detect(
        &self,
        document: &Document,
        record: &mut ProcessingRecord,
    ) -> Result<Vec<PiiInstance>, PipelineError> {
        let max = self.config.detector.max_prompt_chars;
        let detect = |text: &str| {
            self.detector
                .detect(text)
                .map_err(|e| PipelineError::Detection(format!("{e:#}")))
        };

        match self.config.detector.scope {
            DetectionScope::Document => {
                let text = document.full_text();
                let payload = truncate_chars(&text, max);
                if payload.len() < text.len() {
                    record.push_warning(format!(
                        "text truncated to {max} characters for detection; the remainder was not screened"
                    ));
                }
                detect(payload)
            }
            DetectionScope::Page => {
                let pages: Vec<_> = document
                    .pages()
                    .iter()
                    .filter(|page| !page.text.trim().is_empty())
                    .collect();
                // Near-empty documents are still screened once, unscoped.
                if pages.is_empty() {
                    log::debug!("[Pipeline] no page has text, detecting on the whole document");
                    return detect(truncate_chars(&document.full_text(), max));
                }

                let mut instances = Vec::new();
                for page in pages {
                    let payload = truncate_chars(&page.text, max);
                    if payload.len() < page.text.len() {
                        record.push_warning(format!(
                            "page {} truncated to {max} characters for detection",
                            page.index
                        ));
                    }
                    instances.extend(
                        detect(payload)?
                            .into_iter()
                            .map(|instance| instance.on_pages(vec![page.index])),
                    );
                }
                Ok(instances)
            }
        }
    }
}

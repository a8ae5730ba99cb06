//! Core types and collaborator seams for PII redaction tasks.

pub mod document;
pub mod geometry;
pub mod pii;
pub mod record;
pub mod stage;

pub use document::{Document, DocumentParser, Page, PageText, SourceKey, TextToken};
pub use geometry::Rect;
pub use pii::{mask_snippet, PiiDetector, PiiInstance, RedactionRegion};
pub use record::{FailedStep, ProcessingRecord, Status};
pub use stage::{output_name, BlobStage};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid file identifier: {0:?}")]
    InvalidFileId(String),
}

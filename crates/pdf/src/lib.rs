//! PDF text extraction and redaction.

pub mod apply;
pub mod content;
pub mod error;
pub mod extract;
pub mod font;
pub mod metadata;
mod utils;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use apply::{apply_redactions, merge_regions, ApplyOptions, RedactedDocument};
pub use error::{ApplyError, ExtractError};
pub use extract::{extract_pages, LopdfParser};

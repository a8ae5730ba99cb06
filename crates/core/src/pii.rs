//! PII detections and the regions they resolve to.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// One detected sensitive value plus its category label.
///
/// Categories are free-form: the classifier may emit anything ("SSN",
/// "EMAIL", "NAME", ...). `pages` is set when detection ran page by page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiInstance {
    pub value: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<usize>>,
}

impl PiiInstance {
    pub fn new(value: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            category: category.into(),
            pages: None,
        }
    }

    pub fn on_pages(mut self, pages: Vec<usize>) -> Self {
        self.pages = Some(pages);
        self
    }
}

/// A page-local rectangle selected for blackout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionRegion {
    pub page: usize,
    pub rect: Rect,
    pub category: String,
    /// Byte offset of the matched occurrence in the page's raw text.
    pub start: usize,
}

/// PII-detection collaborator.
///
/// Best-effort and non-deterministic: callers must tolerate paraphrased,
/// truncated or mislabelled values.
pub trait PiiDetector: Send + Sync {
    fn detect(&self, text: &str) -> anyhow::Result<Vec<PiiInstance>>;
}

/// Masks a sensitive value for logs and warnings, keeping a few edge characters.
pub fn mask_snippet(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= 4 {
        "*".repeat(len)
    } else {
        let visible = 4.min(len / 3);
        let prefix: String = chars[..visible].iter().collect();
        let suffix: String = chars[len - visible..].iter().collect();
        format!("{}****{}", prefix, suffix)
    }
}

//! Document model shared by extraction, resolution and redaction.
//!
//! A `Document` is the immutable, parsed view of one source file. Redaction
//! never mutates it; the applicator produces new bytes instead.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Separator placed between pages when the whole document is presented as one text.
pub const PAGE_SEPARATOR: &str = "\n\u{c}\n";

/// An atomic run of characters with its own bounding rectangle on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub rect: Rect,
    /// Horizontal character boundaries, one more than the number of chars in
    /// `text`. Empty when the parser only knows the token's overall box.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<f32>,
}

impl TextToken {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            text: text.into(),
            rect,
            edges: Vec::new(),
        }
    }

    pub fn with_edges(text: impl Into<String>, rect: Rect, edges: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            rect,
            edges,
        }
    }

    /// Box of the chars `[from, to)`. Falls back to an even split of the
    /// token width when the boundaries are missing or do not fit the text.
    pub fn char_span(&self, from: usize, to: usize) -> Rect {
        let count = self.text.chars().count();
        if self.edges.len() == count + 1 && to <= count && from <= to {
            return Rect::new(self.edges[from], self.rect.y0, self.edges[to], self.rect.y1);
        }
        let total = count.max(1) as f32;
        self.rect.slice_x(from as f32 / total, to as f32 / total)
    }
}

/// Per-page output of the document-parsing collaborator.
///
/// `tokens` is `None` when the page has no positioned-text layer at all
/// (image-only page). `Some(vec![])` means the layer exists but is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub text: String,
    pub tokens: Option<Vec<TextToken>>,
}

impl PageText {
    pub fn with_tokens(text: impl Into<String>, tokens: Vec<TextToken>) -> Self {
        Self {
            text: text.into(),
            tokens: Some(tokens),
        }
    }

    pub fn image_only() -> Self {
        Self {
            text: String::new(),
            tokens: None,
        }
    }
}

/// Identifies a source file: the stage (collection) plus its relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub stage: String,
    pub path: String,
}

impl SourceKey {
    pub fn new(stage: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.stage, self.path)
    }
}

/// One page of a document, 0-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: usize,
    pub text: String,
    pub tokens: Option<Vec<TextToken>>,
}

impl Page {
    pub fn has_text_layer(&self) -> bool {
        self.tokens.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    key: SourceKey,
    bytes: Vec<u8>,
    pages: Vec<Page>,
}

impl Document {
    pub fn new(key: SourceKey, bytes: Vec<u8>, pages: Vec<PageText>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, p)| Page {
                index,
                text: p.text,
                tokens: p.tokens,
            })
            .collect();
        Self { key, bytes, pages }
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// The original file bytes, untouched.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total number of extracted characters across all pages.
    pub fn text_len(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }

    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    /// True when at least one page carries a positioned-text layer with content.
    pub fn is_machine_readable(&self) -> bool {
        self.pages
            .iter()
            .any(|p| p.tokens.as_ref().is_some_and(|t| !t.is_empty()))
    }

    pub fn image_only_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| !p.has_text_layer())
            .map(|p| p.index)
            .collect()
    }
}

/// Document-parsing collaborator.
///
/// Turns raw file bytes into per-page text and positioned tokens.
pub trait DocumentParser: Send + Sync {
    /// Parses the document; an error means the file is unreadable.
    fn parse(&self, bytes: &[u8]) -> anyhow::Result<Vec<PageText>>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

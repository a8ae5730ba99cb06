//! Geometry index builder.
//!
//! Concatenates a page's positioned tokens into one normalized haystack,
//! remembering which byte range of the haystack each token owns. A query is
//! normalized the same way, matched against the haystack, and every match is
//! mapped back to the rectangles of the tokens it covers.

use crate::normalize::normalize;
use blackout_core::{Document, Page, Rect};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

/// How a token ending in `-` at the end of a line joins the next line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HyphenPolicy {
    /// `"Smith-" / "Jones"` indexes as `"smith-jones"`.
    #[default]
    Join,
    /// `"Smith-" / "Jones"` indexes as `"smithjones"`.
    Drop,
    /// `"Smith-" / "Jones"` indexes as `"smith- jones"`.
    Space,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexOptions {
    pub hyphen_policy: HyphenPolicy,
    /// Horizontal gap between two tokens on one line, as a fraction of glyph
    /// height, above which a space is inferred.
    pub word_gap_ratio: f32,
    /// Vertical centre offset, as a fraction of glyph height, within which two
    /// tokens are considered to share a line.
    pub line_tolerance_ratio: f32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            hyphen_policy: HyphenPolicy::Join,
            word_gap_ratio: 0.15,
            line_tolerance_ratio: 0.5,
        }
    }
}

/// A located run of characters on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOccurrence {
    pub page: usize,
    /// The matched text, normalized.
    pub text: String,
    /// Byte offset of the match in the page's raw text.
    pub start: usize,
    pub bbox: Rect,
    /// One rectangle per line the match spans.
    pub fragments: Vec<Rect>,
}

#[derive(Debug, Clone)]
struct IndexedToken {
    text: String,
    rect: Rect,
    start: usize,
    end: usize,
    chars: usize,
    /// Char boundaries in the normalized text; empty when unknown.
    edges: Vec<f32>,
    raw_offset: usize,
    line: usize,
}

impl IndexedToken {
    /// Box of the normalized chars `[from, to)`.
    fn span(&self, from: usize, to: usize) -> Rect {
        if self.edges.len() == self.chars + 1 && to <= self.chars {
            return Rect::new(self.edges[from], self.rect.y0, self.edges[to], self.rect.y1);
        }
        let total = self.chars.max(1) as f32;
        self.rect.slice_x(from as f32 / total, to as f32 / total)
    }
}

enum Separator {
    None,
    Space,
    DropHyphen,
}

#[derive(Debug, Clone)]
pub struct GeometryIndex {
    page: usize,
    haystack: String,
    tokens: Vec<IndexedToken>,
    has_layer: bool,
}

impl GeometryIndex {
    pub fn build(page: &Page, options: &IndexOptions) -> Self {
        let Some(tokens) = page.tokens.as_deref() else {
            return Self {
                page: page.index,
                haystack: String::new(),
                tokens: Vec::new(),
                has_layer: false,
            };
        };

        let mut haystack = String::new();
        let mut indexed: Vec<IndexedToken> = Vec::with_capacity(tokens.len());
        let mut cursor = 0;
        let mut line = 0;

        for token in tokens {
            let norm = normalize(&token.text);
            if norm.is_empty() {
                continue;
            }
            let raw_offset = locate(&page.text, &token.text, &mut cursor);

            if let Some(prev) = indexed.last_mut() {
                let same_line = on_same_line(&prev.rect, &token.rect, options);
                if !same_line {
                    line += 1;
                }
                match separator(prev, &haystack, &token.rect, same_line, options) {
                    Separator::None => {}
                    Separator::Space => haystack.push(' '),
                    Separator::DropHyphen => {
                        haystack.pop();
                        prev.end -= 1;
                        prev.rect = prev.span(0, prev.chars - 1);
                        prev.chars -= 1;
                        prev.edges.pop();
                    }
                }
            }

            let chars = norm.chars().count();
            // Lowercasing can change the char count; the even split is used then.
            let edges = if token.edges.len() == chars + 1 && token.text.chars().count() == chars {
                token.edges.clone()
            } else {
                Vec::new()
            };

            let start = haystack.len();
            haystack.push_str(&norm);
            indexed.push(IndexedToken {
                text: token.text.clone(),
                rect: token.rect,
                start,
                end: haystack.len(),
                chars,
                edges,
                raw_offset,
                line,
            });
        }

        log::debug!(
            "[Index] page {}: {} tokens, {} lines, {} bytes",
            page.index,
            indexed.len(),
            if indexed.is_empty() { 0 } else { line + 1 },
            haystack.len()
        );

        Self {
            page: page.index,
            haystack,
            tokens: indexed,
            has_layer: true,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// False for image-only pages; every query then returns nothing.
    pub fn has_text_layer(&self) -> bool {
        self.has_layer
    }

    /// The normalized, concatenated page text the index searches.
    pub fn text(&self) -> &str {
        &self.haystack
    }

    /// Every occurrence of `query`, overlapping ones included, in reading order.
    pub fn find(&self, query: &str) -> Vec<TextOccurrence> {
        let needle = normalize(query);
        if needle.is_empty() || self.haystack.is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut from = 0;
        while let Some(pos) = self.haystack[from..].find(&needle) {
            let start = from + pos;
            if let Some(occurrence) = self.occurrence(start, start + needle.len()) {
                found.push(occurrence);
            }
            from = start
                + self.haystack[start..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
            if from >= self.haystack.len() {
                break;
            }
        }
        found
    }

    fn occurrence(&self, start: usize, end: usize) -> Option<TextOccurrence> {
        let mut fragments: Vec<(usize, Rect)> = Vec::new();
        let mut first: Option<(&IndexedToken, usize)> = None;

        for token in self.tokens.iter().filter(|t| t.start < end && t.end > start) {
            let from_char = self.haystack[token.start..start.max(token.start)]
                .chars()
                .count();
            let to_char = self.haystack[token.start..end.min(token.end)]
                .chars()
                .count();
            let rect = token.span(from_char, to_char);

            if first.is_none() {
                first = Some((token, from_char));
            }
            match fragments.last_mut() {
                Some((line, r)) if *line == token.line => *r = r.union(&rect),
                _ => fragments.push((token.line, rect)),
            }
        }

        let (token, char_offset) = first?;
        let within = token
            .text
            .char_indices()
            .nth(char_offset)
            .map_or(0, |(i, _)| i);
        let fragments: Vec<Rect> = fragments.into_iter().map(|(_, r)| r).collect();
        let bbox = fragments
            .iter()
            .skip(1)
            .fold(fragments[0], |acc, r| acc.union(r));

        Some(TextOccurrence {
            page: self.page,
            text: self.haystack[start..end].to_string(),
            start: token.raw_offset + within,
            bbox,
            fragments,
        })
    }
}

/// Byte offset of `needle` in `raw` at or after `cursor`. A token missing
/// from the raw text gets the cursor position as its offset and the cursor
/// moves on, so no two tokens share an offset.
fn locate(raw: &str, needle: &str, cursor: &mut usize) -> usize {
    let from = *cursor;
    let rest = raw.get(from..);
    if let Some(pos) = rest.and_then(|rest| rest.find(needle)) {
        let at = from + pos;
        *cursor = at + needle.len();
        return at;
    }
    *cursor = from + rest.and_then(|r| r.chars().next()).map_or(1, char::len_utf8);
    from
}

fn on_same_line(a: &Rect, b: &Rect, options: &IndexOptions) -> bool {
    let height = a.height().min(b.height()).max(f32::EPSILON);
    (a.center_y() - b.center_y()).abs() <= options.line_tolerance_ratio * height
}

fn separator(
    prev: &IndexedToken,
    haystack: &str,
    next: &Rect,
    same_line: bool,
    options: &IndexOptions,
) -> Separator {
    if same_line {
        let height = prev.rect.height().min(next.height()).max(f32::EPSILON);
        let gap = next.x0 - prev.rect.x1;
        if gap.abs() > options.word_gap_ratio * height {
            Separator::Space
        } else {
            Separator::None
        }
    } else if haystack.ends_with('-') && prev.end - prev.start > 1 {
        match options.hyphen_policy {
            HyphenPolicy::Join => Separator::None,
            HyphenPolicy::Drop => Separator::DropHyphen,
            HyphenPolicy::Space => Separator::Space,
        }
    } else {
        Separator::Space
    }
}

/// Per-document cache of geometry indexes, each built on first use.
pub struct PageIndexes<'d> {
    document: &'d Document,
    options: IndexOptions,
    cells: Vec<OnceCell<GeometryIndex>>,
}

impl<'d> PageIndexes<'d> {
    pub fn new(document: &'d Document, options: IndexOptions) -> Self {
        let cells = (0..document.page_count()).map(|_| OnceCell::new()).collect();
        Self {
            document,
            options,
            cells,
        }
    }

    pub fn get(&self, page: usize) -> Option<&GeometryIndex> {
        let source = self.document.pages().get(page)?;
        let cell = self.cells.get(page)?;
        Some(cell.get_or_init(|| GeometryIndex::build(source, &self.options)))
    }

    pub fn page_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of pages whose index has been built so far.
    pub fn built(&self) -> usize {
        self.cells.iter().filter(|c| c.get().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackout_core::{PageText, SourceKey, TextToken};

    const H: f32 = 12.0;

    fn tok(text: &str, x: f32, y: f32) -> TextToken {
        let width = text.chars().count() as f32 * 6.0;
        TextToken::new(text, Rect::new(x, y, x + width, y + H))
    }

    fn page(text: &str, tokens: Vec<TextToken>) -> Page {
        Page {
            index: 0,
            text: text.to_string(),
            tokens: Some(tokens),
        }
    }

    fn sentence() -> Page {
        page(
            "Name: John Smith, SSN: 123-45-6789",
            vec![
                tok("Name:", 72.0, 700.0),
                tok("John", 108.0, 700.0),
                tok("Smith,", 138.0, 700.0),
                tok("SSN:", 180.0, 700.0),
                tok("123-45-6789", 210.0, 700.0),
            ],
        )
    }

    #[test]
    fn test_single_line_match() {
        let index = GeometryIndex::build(&sentence(), &IndexOptions::default());
        assert_eq!(index.text(), "name: john smith, ssn: 123-45-6789");

        let hits = index.find("John Smith");
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.text, "john smith");
        assert_eq!(hit.start, 6);
        assert_eq!(hit.fragments.len(), 1);
        assert_eq!(hit.bbox.x0, 108.0);
        assert!((hit.bbox.x1 - 168.0).abs() < 0.01);
    }

    #[test]
    fn test_partial_token_offsets() {
        let index = GeometryIndex::build(&sentence(), &IndexOptions::default());
        let hits = index.find("123-45-6789");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 23);
        assert_eq!(hits[0].bbox.x0, 210.0);
    }

    #[test]
    fn test_case_and_whitespace_drift() {
        let index = GeometryIndex::build(&sentence(), &IndexOptions::default());
        assert_eq!(index.find("  JOHN \n  smith ").len(), 1);
    }

    #[test]
    fn test_every_occurrence_is_returned() {
        let p = page(
            "acct 4411 and 4411",
            vec![
                tok("acct", 10.0, 500.0),
                tok("4411", 40.0, 500.0),
                tok("and", 70.0, 500.0),
                tok("4411", 94.0, 500.0),
            ],
        );
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        let hits = index.find("4411");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].start, 5);
        assert_eq!(hits[1].start, 14);
        assert!(hits[0].bbox.x0 < hits[1].bbox.x0);
    }

    #[test]
    fn test_match_across_line_break() {
        let p = page(
            "Signed: Jane\nDoe",
            vec![
                tok("Signed:", 72.0, 700.0),
                tok("Jane", 120.0, 700.0),
                tok("Doe", 72.0, 686.0),
            ],
        );
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        let hits = index.find("jane doe");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragments.len(), 2);
        assert_eq!(hits[0].bbox.y0, 686.0);
        assert_eq!(hits[0].bbox.y1, 712.0);
    }

    #[test]
    fn test_hyphen_policies() {
        let p = page(
            "Smith-\nJones",
            vec![tok("Smith-", 72.0, 700.0), tok("Jones", 72.0, 686.0)],
        );

        let join = GeometryIndex::build(&p, &IndexOptions::default());
        assert_eq!(join.text(), "smith-jones");
        assert_eq!(join.find("Smith-Jones").len(), 1);

        let drop = GeometryIndex::build(
            &p,
            &IndexOptions {
                hyphen_policy: HyphenPolicy::Drop,
                ..IndexOptions::default()
            },
        );
        assert_eq!(drop.text(), "smithjones");
        assert_eq!(drop.find("SmithJones").len(), 1);

        let space = GeometryIndex::build(
            &p,
            &IndexOptions {
                hyphen_policy: HyphenPolicy::Space,
                ..IndexOptions::default()
            },
        );
        assert_eq!(space.text(), "smith- jones");
    }

    #[test]
    fn test_dropped_hyphen_leaves_the_word_box() {
        let p = page(
            "Smith-\nJones",
            vec![tok("Smith-", 72.0, 700.0), tok("Jones", 72.0, 686.0)],
        );
        let index = GeometryIndex::build(
            &p,
            &IndexOptions {
                hyphen_policy: HyphenPolicy::Drop,
                ..IndexOptions::default()
            },
        );
        let hits = index.find("mith");
        assert_eq!(hits.len(), 1);
        assert!((hits[0].bbox.x0 - 78.0).abs() < 1e-3);
        assert!((hits[0].bbox.x1 - 102.0).abs() < 1e-3);
    }

    #[test]
    fn test_match_inside_word_follows_char_edges() {
        // narrow "id:" then a wide W
        let p = page(
            "id:WIL",
            vec![TextToken::with_edges(
                "id:WIL",
                Rect::new(0.0, 700.0, 30.0, 712.0),
                vec![0.0, 3.0, 6.0, 9.0, 20.0, 23.0, 30.0],
            )],
        );
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        let hits = index.find("WIL");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 3);
        assert_eq!(hits[0].bbox, Rect::new(9.0, 700.0, 30.0, 712.0));

        let w = index.find("w");
        assert_eq!(w[0].bbox, Rect::new(9.0, 700.0, 20.0, 712.0));
    }

    #[test]
    fn test_case_folding_that_changes_length_drops_edges() {
        // 'İ' lowercases to two chars
        let p = page(
            "İD",
            vec![TextToken::with_edges(
                "İD",
                Rect::new(0.0, 0.0, 30.0, 12.0),
                vec![0.0, 20.0, 30.0],
            )],
        );
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        let hits = index.find("d");
        assert_eq!(hits.len(), 1);
        assert!((hits[0].bbox.x0 - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_tokens_missing_from_raw_text_get_distinct_offsets() {
        let p = page(
            "",
            vec![tok("4411", 10.0, 500.0), tok("4411", 60.0, 500.0)],
        );
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        let hits = index.find("4411");
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].start, hits[1].start);
    }

    #[test]
    fn test_adjacent_tokens_join_without_space() {
        let p = page(
            "John",
            vec![
                TextToken::new("Jo", Rect::new(100.0, 700.0, 112.0, 712.0)),
                TextToken::new("hn", Rect::new(112.5, 700.0, 124.0, 712.0)),
            ],
        );
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        assert_eq!(index.text(), "john");
        let hits = index.find("john");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragments.len(), 1);
        assert_eq!(hits[0].bbox.x1, 124.0);
    }

    #[test]
    fn test_absent_value_yields_nothing() {
        let index = GeometryIndex::build(&sentence(), &IndexOptions::default());
        assert!(index.find("Jane Doe").is_empty());
        assert!(index.find("   ").is_empty());
    }

    #[test]
    fn test_image_only_page_is_empty() {
        let p = Page {
            index: 3,
            text: String::new(),
            tokens: None,
        };
        let index = GeometryIndex::build(&p, &IndexOptions::default());
        assert!(!index.has_text_layer());
        assert_eq!(index.text(), "");
        assert!(index.find("anything").is_empty());
        assert_eq!(index.page(), 3);
    }

    #[test]
    fn test_page_indexes_build_lazily() {
        let doc = Document::new(
            SourceKey::new("in", "x.pdf"),
            Vec::new(),
            vec![
                PageText::with_tokens("alpha", vec![tok("alpha", 0.0, 0.0)]),
                PageText::with_tokens("beta", vec![tok("beta", 0.0, 0.0)]),
            ],
        );
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        assert_eq!(indexes.page_count(), 2);
        assert_eq!(indexes.built(), 0);

        assert_eq!(indexes.get(1).map(|i| i.text()), Some("beta"));
        assert_eq!(indexes.built(), 1);
        assert!(indexes.get(2).is_none());
    }
}

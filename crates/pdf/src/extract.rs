//! Positioned-text extraction with lopdf.

use crate::content::{walk_text, PlacedGlyph};
use crate::error::ExtractError;
use crate::font::page_fonts;
use crate::utils::{get_page_content, page_ids};
use blackout_core::{DocumentParser, PageText, Rect, TextToken};
use lopdf::content::Content;
use lopdf::Document;

/// Two glyphs further apart than this fraction of their height start a new token.
const TOKEN_GAP_RATIO: f32 = 0.15;
/// Vertical centre offset, as a fraction of height, within which glyphs share a line.
const LINE_TOLERANCE_RATIO: f32 = 0.5;

/// Document parser backed by lopdf content-stream decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfParser;

impl DocumentParser for LopdfParser {
    fn parse(&self, bytes: &[u8]) -> anyhow::Result<Vec<PageText>> {
        Ok(extract_pages(bytes)?)
    }

    fn name(&self) -> &str {
        "lopdf"
    }
}

pub(crate) fn load(bytes: &[u8]) -> Result<Document, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(ExtractError::Load)?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractError::Encrypted);
    }
    Ok(doc)
}

/// Extracts per-page text and tokens, in page order.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let doc = load(bytes)?;
    let ids = page_ids(&doc);
    if ids.is_empty() {
        return Err(ExtractError::NoPages);
    }

    let mut pages = Vec::with_capacity(ids.len());
    for (index, page_id) in ids.into_iter().enumerate() {
        let data = get_page_content(&doc, page_id)
            .map_err(|message| ExtractError::Content { page: index, message })?;
        let content = Content::decode(&data).map_err(|e| ExtractError::Content {
            page: index,
            message: e.to_string(),
        })?;
        let fonts = page_fonts(&doc, page_id);

        let mut builder = TokenBuilder::default();
        let summary = walk_text(&content.operations, &fonts, |_, glyphs| {
            for placed in glyphs {
                builder.push(placed);
            }
        });
        let tokens = builder.finish();

        let page = if tokens.is_empty() && summary.text_shows == 0 && summary.xobject_draws > 0 {
            log::debug!("[Extract] page {}: no text operators, image-only", index);
            PageText::image_only()
        } else {
            log::debug!("[Extract] page {}: {} tokens", index, tokens.len());
            PageText::with_tokens(page_text(&tokens), tokens)
        };
        pages.push(page);
    }

    Ok(pages)
}

fn same_line(a: &Rect, b: &Rect) -> bool {
    let height = a.height().max(b.height()).max(f32::EPSILON);
    (a.center_y() - b.center_y()).abs() <= LINE_TOLERANCE_RATIO * height
}

/// Groups consecutive glyphs into whitespace-free tokens.
#[derive(Default)]
struct TokenBuilder {
    tokens: Vec<TextToken>,
    current: Option<TextToken>,
}

impl TokenBuilder {
    fn push(&mut self, placed: &PlacedGlyph) {
        let text = placed.glyph.text.as_str();
        if text.trim().is_empty() {
            self.flush();
            return;
        }

        if let Some(current) = self.current.as_mut() {
            let height = current.rect.height().max(placed.rect.height());
            let gap = placed.rect.x0 - current.rect.x1;
            let adjacent = same_line(&current.rect, &placed.rect)
                && gap <= TOKEN_GAP_RATIO * height
                && gap >= -0.5 * height;
            if adjacent {
                // The shared boundary sits halfway between the two glyph boxes.
                if let Some(last) = current.edges.last_mut() {
                    *last = (*last + placed.rect.x0) / 2.0;
                }
                current.edges.extend(glyph_edges(text, &placed.rect).into_iter().skip(1));
                current.text.push_str(text);
                current.rect = current.rect.union(&placed.rect);
                return;
            }
        }

        self.flush();
        self.current = Some(TextToken::with_edges(
            text,
            placed.rect,
            glyph_edges(text, &placed.rect),
        ));
    }

    fn flush(&mut self) {
        if let Some(token) = self.current.take() {
            self.tokens.push(token);
        }
    }

    fn finish(mut self) -> Vec<TextToken> {
        self.flush();
        self.tokens
    }
}

/// Char boundaries of one glyph. A glyph mapped to several chars (ligatures,
/// multi-char ToUnicode entries) is split evenly.
fn glyph_edges(text: &str, rect: &Rect) -> Vec<f32> {
    let count = text.chars().count().max(1);
    let step = rect.width() / count as f32;
    (0..=count).map(|i| rect.x0 + step * i as f32).collect()
}

/// Raw page text: tokens joined by a space on a line and a newline between lines.
fn page_text(tokens: &[TextToken]) -> String {
    let mut text = String::new();
    let mut previous: Option<&Rect> = None;
    for token in tokens {
        if let Some(prev) = previous {
            text.push(if same_line(prev, &token.rect) { ' ' } else { '\n' });
        }
        text.push_str(&token.text);
        previous = Some(&token.rect);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        helvetica_width, pdf_with_pages, text_pdf, text_pdf_in, FixtureFont, FixturePage,
    };

    #[test]
    fn test_extracts_tokens_with_positions() {
        let bytes = text_pdf(&[&[(72.0, 700.0, "Name: John Smith, SSN: 123-45-6789")]]);
        let pages = extract_pages(&bytes).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "Name: John Smith, SSN: 123-45-6789");

        let tokens = pages[0].tokens.as_ref().unwrap();
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["Name:", "John", "Smith,", "SSN:", "123-45-6789"]);
        // Helvetica without /Widths: 0.55 em per ASCII glyph at 12pt
        assert!((tokens[1].rect.x0 - (72.0 + 6.0 * 6.6)).abs() < 1e-3);
        assert!((tokens[1].rect.width() - 4.0 * 6.6).abs() < 1e-3);
    }

    #[test]
    fn test_tokens_keep_glyph_edges() {
        for font in [FixtureFont::Proportional, FixtureFont::Cid] {
            let bytes = text_pdf_in(font, &[&[(72.0, 700.0, "Patient:WILLIAM")]]);
            let pages = extract_pages(&bytes).unwrap();
            assert_eq!(pages[0].text, "Patient:WILLIAM", "{font:?}");

            let token = &pages[0].tokens.as_ref().unwrap()[0];
            assert_eq!(token.edges.len(), 16);
            let mut x = 72.0;
            for (c, edge) in token.text.chars().zip(&token.edges) {
                assert!((edge - x).abs() < 1e-2, "{font:?} {c}: {edge} vs {x}");
                x += helvetica_width(c);
            }
            assert!((token.edges[15] - token.rect.x1).abs() < 1e-2);
            // W is more than three times as wide as I
            let w = token.edges[9] - token.edges[8];
            let i = token.edges[10] - token.edges[9];
            assert!(w > 3.0 * i, "{font:?}");
        }
    }

    #[test]
    fn test_lines_are_separated_by_newlines() {
        let bytes = text_pdf(&[&[(72.0, 700.0, "Signed: Jane"), (72.0, 686.0, "Doe")]]);
        let pages = extract_pages(&bytes).unwrap();
        assert_eq!(pages[0].text, "Signed: Jane\nDoe");
    }

    #[test]
    fn test_separate_shows_on_one_line_form_separate_tokens() {
        let bytes = text_pdf(&[&[(72.0, 700.0, "Account"), (140.0, 700.0, "4411")]]);
        let pages = extract_pages(&bytes).unwrap();
        assert_eq!(pages[0].text, "Account 4411");
        assert_eq!(pages[0].tokens.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_image_only_and_blank_pages() {
        let bytes = pdf_with_pages(&[
            FixturePage::Text(&[(72.0, 700.0, "Cover")]),
            FixturePage::Image,
            FixturePage::Text(&[]),
        ]);
        let pages = extract_pages(&bytes).unwrap();
        assert_eq!(pages.len(), 3);
        assert!(pages[1].tokens.is_none());
        assert_eq!(pages[2].tokens, Some(Vec::new()));
        assert_eq!(pages[2].text, "");
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            extract_pages(b"this is not a pdf"),
            Err(ExtractError::Load(_))
        ));
        assert!(LopdfParser.parse(b"").is_err());
    }
}

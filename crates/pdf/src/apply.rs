//! Redaction applicator.
//!
//! For every page with regions, glyphs whose centre falls inside a merged
//! region are removed from the content stream (their advance is kept with a
//! `TJ` adjustment so surrounding text does not move), and an opaque black
//! rectangle is painted over each region on top of the page.

use crate::content::{walk_text, PlacedGlyph, StringRef};
use crate::error::ApplyError;
use crate::extract::load;
use crate::font::page_fonts;
use crate::metadata::clean_metadata;
use crate::utils::{get_page_content, page_ids};
use blackout_core::{Document, Rect, RedactionRegion};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplyOptions {
    /// Strip the Info dictionary and XMP metadata from the output.
    pub clean_metadata: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            clean_metadata: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedactedDocument {
    pub bytes: Vec<u8>,
    /// Number of painted rectangles, after merging.
    pub applied: usize,
    pub pages_modified: usize,
    pub glyphs_removed: usize,
    pub warnings: Vec<String>,
}

/// Groups regions by page and unions every set of intersecting rectangles.
///
/// The result is ordered by page, then top-to-bottom, then left-to-right.
pub fn merge_regions(regions: &[RedactionRegion]) -> BTreeMap<usize, Vec<Rect>> {
    let mut by_page: BTreeMap<usize, Vec<Rect>> = BTreeMap::new();
    for region in regions {
        by_page.entry(region.page).or_default().push(region.rect);
    }

    for rects in by_page.values_mut() {
        let mut merged: Vec<Rect> = Vec::with_capacity(rects.len());
        for rect in rects.drain(..) {
            let mut current = rect;
            // Absorbing one rectangle can make the union reach another.
            loop {
                let before = merged.len();
                merged.retain(|other| {
                    if other.intersects(&current) {
                        current = current.union(other);
                        false
                    } else {
                        true
                    }
                });
                if merged.len() == before {
                    break;
                }
            }
            merged.push(current);
        }
        merged.sort_by(|a, b| {
            b.y1.total_cmp(&a.y1)
                .then(a.x0.total_cmp(&b.x0))
                .then(a.y0.total_cmp(&b.y0))
                .then(a.x1.total_cmp(&b.x1))
        });
        *rects = merged;
    }
    by_page
}

/// Glyph-removal plan for one shown string.
struct StringEdit {
    glyphs: Vec<PlacedGlyph>,
    remove: Vec<bool>,
}

/// Replacement elements for a string: kept runs stay strings, removed runs
/// become the equivalent negative-advance adjustment.
fn rewrite_string(bytes: &[u8], format: StringFormat, edit: &StringEdit) -> Vec<Object> {
    let mut elements = Vec::new();
    let mut kept: Vec<u8> = Vec::new();
    let mut skipped = 0.0f32;

    for (placed, remove) in edit.glyphs.iter().zip(&edit.remove) {
        let glyph = &placed.glyph;
        let end = (glyph.byte_start + glyph.byte_len).min(bytes.len());
        let code = &bytes[glyph.byte_start.min(end)..end];
        if *remove {
            if !kept.is_empty() {
                elements.push(Object::String(std::mem::take(&mut kept), format));
            }
            skipped += placed.advance_units;
        } else {
            if skipped != 0.0 {
                elements.push(Object::Real(-skipped));
                skipped = 0.0;
            }
            kept.extend_from_slice(code);
        }
    }
    if !kept.is_empty() {
        elements.push(Object::String(kept, format));
    }
    if skipped != 0.0 {
        elements.push(Object::Real(-skipped));
    }
    elements
}

fn rewrite_operations(ops: Vec<Operation>, edits: &HashMap<StringRef, StringEdit>) -> Vec<Operation> {
    let mut out = Vec::with_capacity(ops.len() + edits.len() * 3);
    for (index, op) in ops.into_iter().enumerate() {
        let whole = StringRef { op: index, item: None };
        match op.operator.as_str() {
            "Tj" | "'" | "\"" => {
                let position = if op.operator == "\"" { 2 } else { 0 };
                let rewritten = match (edits.get(&whole), op.operands.get(position)) {
                    (Some(edit), Some(Object::String(bytes, format))) => {
                        Some(rewrite_string(bytes, *format, edit))
                    }
                    _ => None,
                };
                let Some(elements) = rewritten else {
                    out.push(op);
                    continue;
                };
                if op.operator == "\"" {
                    out.push(Operation::new("Tw", vec![op.operands[0].clone()]));
                    out.push(Operation::new("Tc", vec![op.operands[1].clone()]));
                }
                if op.operator != "Tj" {
                    out.push(Operation::new("T*", vec![]));
                }
                out.push(Operation::new("TJ", vec![Object::Array(elements)]));
            }
            "TJ" => {
                let len = match op.operands.first() {
                    Some(Object::Array(items)) => items.len(),
                    _ => 0,
                };
                let touched = (0..len).any(|item| {
                    edits.contains_key(&StringRef {
                        op: index,
                        item: Some(item),
                    })
                });
                if !touched {
                    out.push(op);
                    continue;
                }
                let mut elements = Vec::with_capacity(len);
                if let Some(Object::Array(items)) = op.operands.into_iter().next() {
                    for (item, element) in items.into_iter().enumerate() {
                        let at = StringRef {
                            op: index,
                            item: Some(item),
                        };
                        let rewritten = match (edits.get(&at), &element) {
                            (Some(edit), Object::String(bytes, format)) => {
                                Some(rewrite_string(bytes, *format, edit))
                            }
                            _ => None,
                        };
                        match rewritten {
                            Some(parts) => elements.extend(parts),
                            None => elements.push(element),
                        }
                    }
                }
                out.push(Operation::new("TJ", vec![Object::Array(elements)]));
            }
            _ => out.push(op),
        }
    }
    out
}

fn overlay_operations(rects: &[Rect]) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(rects.len() * 2 + 3);
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "rg",
        vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
    ));
    for rect in rects {
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.x0),
                Object::Real(rect.y0),
                Object::Real(rect.width()),
                Object::Real(rect.height()),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
    }
    ops.push(Operation::new("Q", vec![]));
    ops
}

struct PageOutcome {
    glyphs_removed: usize,
    /// Per rectangle, the number of glyphs removed under it.
    hits: Vec<usize>,
}

fn redact_page(
    doc: &mut lopdf::Document,
    page: usize,
    page_id: ObjectId,
    rects: &[Rect],
) -> Result<PageOutcome, ApplyError> {
    let page_error = |message: String| ApplyError::Page { page, message };

    let data = get_page_content(doc, page_id).map_err(page_error)?;
    let content = Content::decode(&data).map_err(|e| page_error(e.to_string()))?;
    let fonts = page_fonts(doc, page_id);

    let mut edits: HashMap<StringRef, StringEdit> = HashMap::new();
    let mut hits = vec![0usize; rects.len()];
    let mut glyphs_removed = 0;

    walk_text(&content.operations, &fonts, |at, glyphs| {
        let mut remove = vec![false; glyphs.len()];
        for (i, placed) in glyphs.iter().enumerate() {
            let (cx, cy) = (
                (placed.rect.x0 + placed.rect.x1) / 2.0,
                placed.rect.center_y(),
            );
            if let Some(hit) = rects.iter().position(|r| r.contains_point(cx, cy)) {
                remove[i] = true;
                hits[hit] += 1;
                glyphs_removed += 1;
            }
        }
        if remove.iter().any(|r| *r) {
            edits.insert(
                at,
                StringEdit {
                    glyphs: glyphs.to_vec(),
                    remove,
                },
            );
        }
    });

    let mut operations = Vec::with_capacity(content.operations.len() + rects.len() * 2 + 8);
    operations.push(Operation::new("q", vec![]));
    operations.extend(rewrite_operations(content.operations, &edits));
    operations.push(Operation::new("Q", vec![]));
    operations.extend(overlay_operations(rects));

    let encoded = Content { operations }
        .encode()
        .map_err(|e| page_error(e.to_string()))?;
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), encoded));
    match doc.get_object_mut(page_id) {
        Ok(Object::Dictionary(dict)) => dict.set("Contents", Object::Reference(stream_id)),
        _ => return Err(page_error("page object is not a dictionary".to_string())),
    }

    Ok(PageOutcome {
        glyphs_removed,
        hits,
    })
}

/// Produces a redacted copy of `document`. The source document is not modified.
pub fn apply_redactions(
    document: &Document,
    regions: &[RedactionRegion],
    options: &ApplyOptions,
) -> Result<RedactedDocument, ApplyError> {
    let mut doc = load(document.bytes())?;
    let ids = page_ids(&doc);

    let mut warnings = Vec::new();
    let mut applied = 0;
    let mut pages_modified = 0;
    let mut glyphs_removed = 0;

    for (page, rects) in merge_regions(regions) {
        let Some(page_id) = ids.get(page).copied() else {
            warnings.push(format!(
                "region on page {} skipped: document has {} pages",
                page,
                ids.len()
            ));
            continue;
        };

        let outcome = redact_page(&mut doc, page, page_id, &rects)?;
        for (rect, hit) in rects.iter().zip(&outcome.hits) {
            if *hit == 0 {
                warnings.push(format!(
                    "visual-only redaction on page {}: no text removed under ({:.1}, {:.1}, {:.1}, {:.1})",
                    page, rect.x0, rect.y0, rect.x1, rect.y1
                ));
            }
        }
        log::info!(
            "[Redact] page {}: {} regions painted, {} glyphs removed",
            page,
            rects.len(),
            outcome.glyphs_removed
        );

        applied += rects.len();
        glyphs_removed += outcome.glyphs_removed;
        pages_modified += 1;
    }

    // Drops the replaced content streams, which still hold the original text.
    doc.prune_objects();

    if options.clean_metadata {
        let cleaned = clean_metadata(&mut doc);
        log::debug!("[Redact] metadata: {} items removed", cleaned.items_removed);
    }

    doc.compress();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ApplyError::Save(e.to_string()))?;

    Ok(RedactedDocument {
        bytes,
        applied,
        pages_modified,
        glyphs_removed,
        warnings,
    })
}

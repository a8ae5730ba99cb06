//! Content-stream text walker.
//!
//! Tracks the graphics and text state through a decoded content stream and
//! reports every shown string together with the page-space box of each of
//! its glyphs. Extraction and redaction share this walk, so the rectangles a
//! redaction is matched against are exactly the ones extraction reported.

use crate::font::{FontMap, FontMetrics, Glyph};
use crate::utils::get_number;
use blackout_core::Rect;
use lopdf::content::Operation;
use lopdf::Object;

/// Glyph box in glyph space, as a fraction of the font size.
const DESCENT: f32 = -0.2;
const ASCENT: f32 = 0.8;

/// Affine transform `[a b c d e f]`, row-vector convention as in PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix([f32; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self([a, b, c, d, e, f])
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, operand) in m.iter_mut().zip(operands) {
            *slot = get_number(operand)?;
        }
        Some(Matrix(m))
    }
}

/// Text state parameters; saved and restored with the graphics state.
#[derive(Debug, Clone)]
struct TextState {
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    font: Option<Vec<u8>>,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            font_size: 12.0,
        }
    }
}

/// Position of a string operand: the operation index, plus the element index
/// when the string sits inside a `TJ` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringRef {
    pub op: usize,
    pub item: Option<usize>,
}

/// A glyph with its page-space box.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGlyph {
    pub glyph: Glyph,
    pub rect: Rect,
    /// Total displacement of the glyph, spacing included, expressed in `TJ`
    /// adjustment units (thousandths of the font size).
    pub advance_units: f32,
}

/// Operator counts gathered during a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub text_shows: usize,
    pub xobject_draws: usize,
}

struct Walker<'f> {
    fonts: &'f FontMap,
    fallback: FontMetrics,
    ctm: Matrix,
    tm: Matrix,
    tlm: Matrix,
    state: TextState,
    stack: Vec<(Matrix, TextState)>,
}

impl<'f> Walker<'f> {
    fn new(fonts: &'f FontMap) -> Self {
        Self {
            fonts,
            fallback: FontMetrics::fallback(),
            ctm: Matrix::IDENTITY,
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            state: TextState::default(),
            stack: Vec::new(),
        }
    }

    fn font(&self) -> &FontMetrics {
        self.state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback)
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).multiply(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    /// Applies a `TJ` number adjustment.
    fn adjust(&mut self, amount: f32) {
        let tx = -amount / 1000.0 * self.state.font_size * self.state.horizontal_scale;
        self.tm = Matrix::translate(tx, 0.0).multiply(&self.tm);
    }

    fn show(&mut self, bytes: &[u8]) -> Vec<PlacedGlyph> {
        let glyphs = self.font().decode(bytes);
        let size = self.state.font_size;
        let scale = self.state.horizontal_scale;
        let params = Matrix::new(size * scale, 0.0, 0.0, size, 0.0, self.state.rise);

        let mut placed = Vec::with_capacity(glyphs.len());
        for glyph in glyphs {
            let trm = params.multiply(&self.tm).multiply(&self.ctm);
            let w = glyph.width / 1000.0;
            let corners = [
                trm.apply(0.0, DESCENT),
                trm.apply(w, DESCENT),
                trm.apply(w, ASCENT),
                trm.apply(0.0, ASCENT),
            ];
            let x0 = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
            let x1 = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
            let y0 = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
            let y1 = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

            let spacing = self.state.char_spacing
                + if glyph.is_word_space {
                    self.state.word_spacing
                } else {
                    0.0
                };
            let tx = (w * size + spacing) * scale;
            let advance_units = if size != 0.0 {
                glyph.width + spacing * 1000.0 / size
            } else {
                glyph.width
            };
            self.tm = Matrix::translate(tx, 0.0).multiply(&self.tm);

            placed.push(PlacedGlyph {
                glyph,
                rect: Rect::new(x0, y0, x1, y1),
                advance_units,
            });
        }
        placed
    }
}

fn string_operand(obj: Option<&Object>) -> Option<&[u8]> {
    match obj {
        Some(Object::String(bytes, _)) => Some(bytes),
        _ => None,
    }
}

/// Walks `ops`, calling `visit` once per shown string with its placed glyphs.
pub fn walk_text<F>(ops: &[Operation], fonts: &FontMap, mut visit: F) -> WalkSummary
where
    F: FnMut(StringRef, &[PlacedGlyph]),
{
    let mut walker = Walker::new(fonts);
    let mut summary = WalkSummary::default();

    for (index, op) in ops.iter().enumerate() {
        let operands = &op.operands;
        let number = |i: usize| operands.get(i).and_then(get_number);

        match op.operator.as_str() {
            "q" => walker.stack.push((walker.ctm, walker.state.clone())),
            "Q" => {
                if let Some((ctm, state)) = walker.stack.pop() {
                    walker.ctm = ctm;
                    walker.state = state;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    walker.ctm = m.multiply(&walker.ctm);
                }
            }
            "BT" => {
                walker.tm = Matrix::IDENTITY;
                walker.tlm = Matrix::IDENTITY;
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    walker.tm = m;
                    walker.tlm = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    walker.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    walker.state.leading = -ty;
                    walker.move_line(tx, ty);
                }
            }
            "T*" => walker.next_line(),
            "TL" => {
                if let Some(v) = number(0) {
                    walker.state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = number(0) {
                    walker.state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = number(0) {
                    walker.state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = number(0) {
                    walker.state.horizontal_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = number(0) {
                    walker.state.rise = v;
                }
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    walker.state.font = Some(name.clone());
                }
                if let Some(size) = number(1) {
                    walker.state.font_size = size;
                }
            }
            "Tj" => {
                if let Some(bytes) = string_operand(operands.first()) {
                    summary.text_shows += 1;
                    let placed = walker.show(bytes);
                    visit(StringRef { op: index, item: None }, &placed);
                }
            }
            "'" => {
                walker.next_line();
                if let Some(bytes) = string_operand(operands.first()) {
                    summary.text_shows += 1;
                    let placed = walker.show(bytes);
                    visit(StringRef { op: index, item: None }, &placed);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (number(0), number(1)) {
                    walker.state.word_spacing = aw;
                    walker.state.char_spacing = ac;
                }
                walker.next_line();
                if let Some(bytes) = string_operand(operands.get(2)) {
                    summary.text_shows += 1;
                    let placed = walker.show(bytes);
                    visit(StringRef { op: index, item: None }, &placed);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    summary.text_shows += 1;
                    for (item, element) in items.iter().enumerate() {
                        match element {
                            Object::String(bytes, _) => {
                                let placed = walker.show(bytes);
                                visit(StringRef { op: index, item: Some(item) }, &placed);
                            }
                            other => {
                                if let Some(amount) = get_number(other) {
                                    walker.adjust(amount);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => summary.xobject_draws += 1,
            _ => {}
        }
    }

    summary
}

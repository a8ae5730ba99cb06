//! Font metrics and glyph decoding for text-showing operators.
//!
//! Only what positioning needs is read: code width (`/Widths` for simple
//! fonts, `/W` + `/DW` for CID fonts) and the `/ToUnicode` map. Anything the
//! font dictionary does not declare falls back to an em-based estimate.

use crate::utils::{get_number, get_stream_content, page_resources, resolve, resolve_dict};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;

/// Font resources of one page, keyed by resource name (`F1`, ...).
pub type FontMap = HashMap<Vec<u8>, FontMetrics>;

/// One decoded character code of a shown string.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// Byte range of the code inside the string operand.
    pub byte_start: usize,
    pub byte_len: usize,
    /// Horizontal displacement in thousandths of text space.
    pub width: f32,
    pub text: String,
    /// Single-byte code 32, the only code word spacing applies to.
    pub is_word_space: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FontMetrics {
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    default_width: Option<f32>,
    cid_widths: HashMap<u32, f32>,
    to_unicode: HashMap<u32, String>,
}

/// Width estimate for codes without a declared metric, in thousandths of an em.
fn estimate_width(code: u32) -> f32 {
    if code < 128 {
        550.0
    } else {
        1000.0
    }
}

impl FontMetrics {
    /// Metrics used when a font resource cannot be found.
    pub fn fallback() -> Self {
        Self::default()
    }

    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let mut metrics = Self::default();

        let is_type0 = matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Type0");
        if is_type0 {
            metrics.two_byte = true;
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .and_then(|o| resolve_dict(doc, o));
            if let Some(cid_font) = descendant {
                metrics.default_width = cid_font.get(b"DW").ok().and_then(get_number);
                if let Some(Object::Array(w)) = cid_font.get(b"W").ok().and_then(|o| resolve(doc, o)) {
                    metrics.cid_widths = parse_cid_widths(doc, w);
                }
            }
        } else {
            metrics.first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(get_number)
                .map_or(0, |n| n.max(0.0) as u32);
            if let Some(Object::Array(widths)) = dict.get(b"Widths").ok().and_then(|o| resolve(doc, o)) {
                metrics.widths = widths
                    .iter()
                    .map(|w| resolve(doc, w).and_then(get_number).unwrap_or(0.0))
                    .collect();
            }
        }

        if let Some(Object::Stream(stream)) = dict.get(b"ToUnicode").ok().and_then(|o| resolve(doc, o)) {
            metrics.to_unicode = parse_to_unicode(&get_stream_content(stream));
        }

        metrics
    }

    pub fn is_two_byte(&self) -> bool {
        self.two_byte
    }

    fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .or(self.default_width)
                .unwrap_or(1000.0);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or_else(|| estimate_width(code))
    }

    fn text(&self, code: u32) -> String {
        if let Some(mapped) = self.to_unicode.get(&code) {
            return mapped.clone();
        }
        // Single-byte codes read as Latin-1, close enough to WinAnsi for printable text.
        match char::from_u32(code) {
            Some(c) if !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        }
    }

    /// Splits a shown string into glyphs.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let step = if self.two_byte { 2 } else { 1 };
        bytes
            .chunks(step)
            .enumerate()
            .map(|(i, chunk)| {
                let code = code_of(chunk);
                Glyph {
                    byte_start: i * step,
                    byte_len: chunk.len(),
                    width: self.width(code),
                    text: self.text(code),
                    is_word_space: !self.two_byte && code == 32,
                }
            })
            .collect()
    }
}

/// Font metrics for every font resource of a page.
pub fn page_fonts(doc: &Document, page_id: ObjectId) -> FontMap {
    let mut fonts = FontMap::new();
    let Some(resources) = page_resources(doc, page_id) else {
        return fonts;
    };
    let Some(font_dict) = resources.get(b"Font").ok().and_then(|o| resolve_dict(doc, o)) else {
        return fonts;
    };
    for (name, value) in font_dict.iter() {
        if let Some(dict) = resolve_dict(doc, value) {
            fonts.insert(name.clone(), FontMetrics::from_dict(doc, dict));
        }
    }
    fonts
}

/// `/W` array: `c [w1 w2 ...]` or `c_first c_last w`.
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = get_number(&w[i]) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match w.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, value) in list.iter().enumerate() {
                    let code = u32::try_from(offset).ok().and_then(|o| first.checked_add(o));
                    let Some(code) = code else {
                        break;
                    };
                    if let Some(width) = get_number(value) {
                        widths.insert(code, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (get_number(last), w.get(i + 2).and_then(get_number)) else {
                    break;
                };
                let last = last.max(0.0) as u32;
                // Guard against absurd ranges in broken files.
                for code in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(code, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

fn tokenize_cmap(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'[' => {
                tokens.push(CMapToken::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(CMapToken::ArrayEnd);
                i += 1;
            }
            b'<' if data.get(i + 1) == Some(&b'<') => {
                tokens.push(CMapToken::Word("<<".to_string()));
                i += 2;
            }
            b'>' if data.get(i + 1) == Some(&b'>') => {
                tokens.push(CMapToken::Word(">>".to_string()));
                i += 2;
            }
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|c| *c == b'>')
                    .map_or(data.len(), |p| i + 1 + p);
                tokens.push(CMapToken::Hex(decode_hex(&data[i + 1..end])));
                i = end + 1;
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'[' | b']' | b'<' | b'>' | b'%')
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                    continue;
                }
                tokens.push(CMapToken::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn decode_hex(hex: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .iter()
        .filter_map(|c| (*c as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parses the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Char,
        Range,
    }

    let tokens = tokenize_cmap(data);
    let mut map = HashMap::new();
    let mut section = Section::None;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Word(w) if w == "beginbfchar" => section = Section::Char,
            CMapToken::Word(w) if w == "beginbfrange" => section = Section::Range,
            CMapToken::Word(w) if w == "endbfchar" || w == "endbfrange" => section = Section::None,
            CMapToken::Hex(src) if section == Section::Char => {
                if let Some(CMapToken::Hex(dst)) = tokens.get(i + 1) {
                    map.insert(code_of(src), utf16_text(dst));
                    i += 1;
                }
            }
            CMapToken::Hex(lo) if section == Section::Range => {
                let Some(CMapToken::Hex(hi)) = tokens.get(i + 1) else {
                    i += 1;
                    continue;
                };
                let (lo, hi) = (code_of(lo), code_of(hi));
                let hi = hi.min(lo.saturating_add(0xFFFF));
                match tokens.get(i + 2) {
                    Some(CMapToken::Hex(dst)) => {
                        let mut units: Vec<u16> = dst
                            .chunks(2)
                            .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
                            .collect();
                        for code in lo..=hi {
                            map.insert(code, String::from_utf16_lossy(&units));
                            if let Some(last) = units.last_mut() {
                                *last = last.wrapping_add(1);
                            }
                        }
                        i += 2;
                    }
                    Some(CMapToken::ArrayStart) => {
                        let mut j = i + 3;
                        let mut code = Some(lo);
                        while let Some(CMapToken::Hex(dst)) = tokens.get(j) {
                            if let Some(c) = code.filter(|c| *c <= hi) {
                                map.insert(c, utf16_text(dst));
                            }
                            code = code.and_then(|c| c.checked_add(1));
                            j += 1;
                        }
                        // j points at the closing bracket
                        i = j;
                    }
                    _ => i += 1,
                }
            }
            _ => {}
        }
        i += 1;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_fallback_estimates_widths() {
        let glyphs = FontMetrics::fallback().decode(b"A \xe9");
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].width, 550.0);
        assert!(glyphs[1].is_word_space);
        assert_eq!(glyphs[2].width, 1000.0);
        assert_eq!(glyphs[2].text, "é");
    }

    #[test]
    fn test_simple_font_widths() {
        let doc = Document::with_version("1.5");
        let dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "FirstChar" => 65,
            "Widths" => vec![Object::Integer(700), Object::Integer(600)],
        };
        let metrics = FontMetrics::from_dict(&doc, &dict);
        let glyphs = metrics.decode(b"ABC");
        assert_eq!(glyphs[0].width, 700.0);
        assert_eq!(glyphs[1].width, 600.0);
        // outside the declared range
        assert_eq!(glyphs[2].width, 550.0);
    }

    #[test]
    fn test_to_unicode_bfchar_and_bfrange() {
        let cmap = b"/CIDInit /ProcSet findresource begin\n\
            begincmap\n\
            1 begincodespacerange <0000> <FFFF> endcodespacerange\n\
            2 beginbfchar\n<0003> <0020>\n<0011> <004A>\nendbfchar\n\
            2 beginbfrange\n<0020> <0022> <0061>\n<0030> <0031> [<0058> <0059>]\nendbfrange\n\
            endcmap";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
        assert_eq!(map.get(&0x11).map(String::as_str), Some("J"));
        assert_eq!(map.get(&0x20).map(String::as_str), Some("a"));
        assert_eq!(map.get(&0x22).map(String::as_str), Some("c"));
        assert_eq!(map.get(&0x31).map(String::as_str), Some("Y"));
        assert_eq!(map.len(), 7);
    }

    #[test]
    fn test_widths_near_the_code_limit_do_not_overflow() {
        let doc = Document::with_version("1.5");
        let w = vec![
            Object::Integer(u32::MAX as i64),
            Object::Array(vec![Object::Integer(500), Object::Integer(600)]),
        ];
        let widths = parse_cid_widths(&doc, &w);
        assert_eq!(widths.get(&u32::MAX), Some(&500.0));
        assert_eq!(widths.len(), 1);

        let cmap = b"1 beginbfrange\n<FFFFFFFF> <FFFFFFFF> [<0041> <0042>]\nendbfrange";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&u32::MAX).map(String::as_str), Some("A"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_two_byte_font_decoding() {
        let mut doc = Document::with_version("1.5");
        let cid_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "DW" => 500,
            "W" => vec![Object::Integer(17), Object::Array(vec![Object::Integer(640)])],
        });
        let dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "DescendantFonts" => vec![Object::Reference(cid_font)],
        };
        let metrics = FontMetrics::from_dict(&doc, &dict);
        assert!(metrics.is_two_byte());
        let glyphs = metrics.decode(&[0x00, 0x11, 0x00, 0x4A]);
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].width, 640.0);
        assert_eq!(glyphs[1].width, 500.0);
        assert_eq!(glyphs[1].text, "J");
        assert_eq!(glyphs[1].byte_start, 2);
    }
}

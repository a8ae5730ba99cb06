//! Synthetic PDFs for tests.
//!
//! Text is drawn at 12pt. The default font is Helvetica without a `/Widths`
//! array, so glyph boxes follow the em-based width estimate (6.6pt per ASCII
//! glyph). [`FixtureFont::Proportional`] declares the real Helvetica widths
//! and [`FixtureFont::Cid`] declares them through a Type0 font's `/W` array.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

pub const FONT_SIZE: f32 = 12.0;

/// Helvetica advance widths for codes 32..=126, thousandths of an em.
const HELVETICA_WIDTHS: [i64; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

/// Width in points of `c` at [`FONT_SIZE`] under [`FixtureFont::Proportional`]
/// and [`FixtureFont::Cid`].
pub fn helvetica_width(c: char) -> f32 {
    let width = (c as usize)
        .checked_sub(32)
        .and_then(|i| HELVETICA_WIDTHS.get(i))
        .copied()
        .unwrap_or(1000);
    width as f32 * FONT_SIZE / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureFont {
    /// Helvetica with no metrics in the PDF.
    Estimated,
    /// Simple Helvetica with `/FirstChar` and `/Widths`.
    Proportional,
    /// Type0 font, two-byte Identity-H codes, `/W` widths and a ToUnicode map.
    Cid,
}

impl FixtureFont {
    fn resource(self) -> &'static str {
        match self {
            FixtureFont::Estimated => "F1",
            FixtureFont::Proportional => "F2",
            FixtureFont::Cid => "F3",
        }
    }

    fn encode(self, text: &str) -> Object {
        match self {
            FixtureFont::Cid => {
                let bytes = text
                    .chars()
                    .flat_map(|c| (c as u32 as u16).to_be_bytes())
                    .collect();
                Object::String(bytes, StringFormat::Hexadecimal)
            }
            _ => Object::String(text.as_bytes().to_vec(), StringFormat::Literal),
        }
    }
}

pub enum FixturePage<'a> {
    /// `(x, y, text)` runs, each drawn with its own `BT .. ET` block.
    Text(&'a [(f32, f32, &'a str)]),
    /// Like `Text`, in the given font.
    Styled(FixtureFont, &'a [(f32, f32, &'a str)]),
    /// A page that only paints an image XObject.
    Image,
}

fn text_operations(font: FixtureFont, runs: &[(f32, f32, &str)]) -> Vec<Operation> {
    runs.iter()
        .flat_map(|(x, y, text)| {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.resource().into(), FONT_SIZE.into()]),
                Operation::new("Td", vec![(*x).into(), (*y).into()]),
                Operation::new("Tj", vec![font.encode(text)]),
                Operation::new("ET", vec![]),
            ]
        })
        .collect()
}

fn add_fonts(doc: &mut Document) -> lopdf::Dictionary {
    let widths: Vec<Object> = HELVETICA_WIDTHS.iter().map(|w| Object::Integer(*w)).collect();

    let estimated = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let proportional = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "FirstChar" => 32,
        "LastChar" => 126,
        "Widths" => widths.clone(),
        "Encoding" => "WinAnsiEncoding",
    });

    let cid_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "Helvetica",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "DW" => 1000,
        "W" => vec![Object::Integer(32), Object::Array(widths)],
    });
    let to_unicode = doc.add_object(Stream::new(
        dictionary! {},
        b"/CIDInit /ProcSet findresource begin\n\
          12 dict begin\n\
          begincmap\n\
          1 begincodespacerange <0000> <FFFF> endcodespacerange\n\
          1 beginbfrange\n<0020> <007E> <0020>\nendbfrange\n\
          endcmap\n\
          end end\n"
            .to_vec(),
    ));
    let cid = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "Helvetica",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font)],
        "ToUnicode" => to_unicode,
    });

    dictionary! {
        "F1" => estimated,
        "F2" => proportional,
        "F3" => cid,
    }
}

fn image_operations() -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![200.into(), 0.into(), 0.into(), 200.into(), 100.into(), 400.into()],
        ),
        Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

fn build(pages: &[FixturePage], title: Option<&str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let fonts = add_fonts(&mut doc);
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0x80],
    ));
    let resources_id = doc.add_object(dictionary! {
        "Font" => fonts,
        "XObject" => dictionary! { "Im1" => image_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let operations = match page {
            FixturePage::Text(runs) => text_operations(FixtureFont::Estimated, runs),
            FixturePage::Styled(font, runs) => text_operations(*font, runs),
            FixturePage::Image => image_operations(),
        };
        let data = Content { operations }
            .encode()
            .expect("fixture content encodes");
        let content_id = doc.add_object(Stream::new(dictionary! {}, data));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(title) = title {
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Author" => Object::string_literal("Records Office"),
        });
        doc.trailer.set("Info", info_id);
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("fixture PDF saves");
    buffer
}

pub fn pdf_with_pages(pages: &[FixturePage]) -> Vec<u8> {
    build(pages, None)
}

/// One page per entry, each a list of `(x, y, text)` runs.
pub fn text_pdf(pages: &[&[(f32, f32, &str)]]) -> Vec<u8> {
    let pages: Vec<FixturePage> = pages.iter().map(|runs| FixturePage::Text(*runs)).collect();
    build(&pages, None)
}

/// Like [`text_pdf`], drawn in `font`.
pub fn text_pdf_in(font: FixtureFont, pages: &[&[(f32, f32, &str)]]) -> Vec<u8> {
    let pages: Vec<FixturePage> = pages
        .iter()
        .map(|runs| FixturePage::Styled(font, *runs))
        .collect();
    build(&pages, None)
}

/// Like [`text_pdf`], with a document-information dictionary carrying a title.
pub fn text_pdf_with_title(pages: &[&[(f32, f32, &str)]], title: &str) -> Vec<u8> {
    let pages: Vec<FixturePage> = pages.iter().map(|runs| FixturePage::Text(*runs)).collect();
    build(&pages, Some(title))
}

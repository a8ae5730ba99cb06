//! Post-processing verification checks.
//!
//! The redacted output is parsed again from its bytes and every value that
//! was resolved before redaction is searched for on its page. A hit means the
//! region was painted but the text underneath is still extractable.

use blackout_core::{mask_snippet, Document, SourceKey};
use blackout_pdf::extract_pages;
use blackout_text::{IndexOptions, PageIndexes, ResolvedValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResult {
    pub ok: bool,
    pub warnings: Vec<String>,
    /// Values still present in the output text layer.
    #[serde(skip)]
    pub leaked: Vec<ResolvedValue>,
}

pub fn verify_output(bytes: &[u8], expected: &[ResolvedValue], options: &IndexOptions) -> VerifyResult {
    let pages = match extract_pages(bytes) {
        Ok(pages) => pages,
        Err(e) => {
            log::warn!("[Verify] output could not be re-read: {}", e);
            return VerifyResult {
                ok: false,
                warnings: vec![format!("output could not be re-read: {e}")],
                leaked: Vec::new(),
            };
        }
    };

    let document = Document::new(SourceKey::new("output", ""), Vec::new(), pages);
    let indexes = PageIndexes::new(&document, options.clone());
    let mut result = VerifyResult {
        ok: true,
        ..VerifyResult::default()
    };

    for value in expected {
        let Some(index) = indexes.get(value.page) else {
            continue;
        };
        if index.find(&value.value).is_empty() {
            continue;
        }
        log::warn!(
            "[Verify] {} value still extractable on page {}",
            value.category,
            value.page
        );
        result.warnings.push(format!(
            "visual-only redaction on page {}: {} value {} is still extractable",
            value.page,
            value.category,
            mask_snippet(&value.value)
        ));
        result.leaked.push(value.clone());
        result.ok = false;
    }

    result
}

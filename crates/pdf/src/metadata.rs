//! Document metadata cleaning.
//!
//! Titles, authors and XMP packets frequently repeat the same personal data
//! the page text carries, so the redacted copy drops them.

use crate::utils::get_catalog_id;
use lopdf::{Dictionary, Document, Object, StringFormat};

/// Cleaning outcome.
#[derive(Debug, Clone, Default)]
pub struct CleanResult {
    pub items_removed: usize,
    pub details: Vec<String>,
}

impl CleanResult {
    pub fn add(&mut self, detail: String) {
        self.items_removed += 1;
        self.details.push(detail);
    }

    pub fn merge(&mut self, other: CleanResult) {
        self.items_removed += other.items_removed;
        self.details.extend(other.details);
    }
}

const INFO_FIELDS: [&[u8]; 8] = [
    b"Title",
    b"Author",
    b"Subject",
    b"Keywords",
    b"Creator",
    b"Producer",
    b"CreationDate",
    b"ModDate",
];

/// Clears the document information dictionary.
pub fn clean_info_dict(doc: &mut Document) -> CleanResult {
    let mut result = CleanResult::default();

    let info_id = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => *id,
        Ok(Object::Dictionary(_)) => {
            doc.trailer.remove(b"Info");
            result.add("removed inline Info dictionary".to_string());
            return result;
        }
        _ => return result,
    };

    if let Ok(Object::Dictionary(ref mut info_dict)) = doc.get_object_mut(info_id) {
        for field in INFO_FIELDS {
            if info_dict.has(field) {
                info_dict.remove(field);
                result.add(format!("removed Info/{}", String::from_utf8_lossy(field)));
            }
        }
    }

    let empty = matches!(doc.get_object(info_id), Ok(Object::Dictionary(d)) if d.is_empty());
    if empty {
        doc.trailer.remove(b"Info");
        doc.objects.remove(&info_id);
        result.add("removed empty Info dictionary".to_string());
    }

    log::debug!("[Metadata] Info cleaned: {} items", result.items_removed);
    result
}

/// Removes the catalog's `/Metadata` (XMP) stream.
pub fn clean_xmp_metadata(doc: &mut Document) -> CleanResult {
    let mut result = CleanResult::default();
    let Some(catalog_id) = get_catalog_id(doc) else {
        return result;
    };

    let metadata_ref = match doc.get_object(catalog_id) {
        Ok(Object::Dictionary(catalog)) => match catalog.get(b"Metadata") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        },
        _ => None,
    };

    if let Some(metadata_id) = metadata_ref {
        doc.objects.remove(&metadata_id);
        result.add(format!("removed XMP stream {:?}", metadata_id));
    }
    if let Ok(Object::Dictionary(ref mut catalog)) = doc.get_object_mut(catalog_id) {
        if catalog.has(b"Metadata") {
            catalog.remove(b"Metadata");
            result.add("removed Catalog/Metadata".to_string());
        }
    }

    log::debug!("[Metadata] XMP cleaned: {} items", result.items_removed);
    result
}

/// Marks the output with the producing tool. No timestamps, so repeated runs
/// over the same input stay byte-identical.
pub fn set_producer(doc: &mut Document) {
    let producer = format!("blackout {}", env!("CARGO_PKG_VERSION"));

    let info_id = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => *id,
        _ => {
            let new_id = doc.add_object(Object::Dictionary(Dictionary::new()));
            doc.trailer.set(b"Info", Object::Reference(new_id));
            new_id
        }
    };

    if let Ok(Object::Dictionary(ref mut info_dict)) = doc.get_object_mut(info_id) {
        info_dict.set(
            b"Producer",
            Object::String(producer.into_bytes(), StringFormat::Literal),
        );
    }
}

/// Full cleaning pass applied to redacted output.
pub fn clean_metadata(doc: &mut Document) -> CleanResult {
    let mut result = clean_info_dict(doc);
    result.merge(clean_xmp_metadata(doc));
    set_producer(doc);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::text_pdf_with_title;

    fn info(doc: &Document) -> Option<&Dictionary> {
        match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => doc.get_object(*id).and_then(Object::as_dict).ok(),
            _ => None,
        }
    }

    #[test]
    fn test_clean_result() {
        let mut result = CleanResult::default();
        result.add("test1".to_string());
        result.add("test2".to_string());
        assert_eq!(result.items_removed, 2);
        assert_eq!(result.details.len(), 2);
    }

    #[test]
    fn test_clean_metadata_strips_title_and_author() {
        let bytes = text_pdf_with_title(&[&[(72.0, 700.0, "hello")]], "Jane Doe medical file");
        let mut doc = Document::load_mem(&bytes).unwrap();

        let result = clean_metadata(&mut doc);
        assert_eq!(result.items_removed, 3);

        let info = info(&doc).unwrap();
        assert!(!info.has(b"Title"));
        assert!(!info.has(b"Author"));
        assert!(info.has(b"Producer"));
    }

    #[test]
    fn test_xmp_stream_is_removed() {
        let bytes = text_pdf_with_title(&[&[(72.0, 700.0, "hello")]], "t");
        let mut doc = Document::load_mem(&bytes).unwrap();
        let xmp = doc.add_object(lopdf::Stream::new(Dictionary::new(), b"<x:xmpmeta/>".to_vec()));
        let catalog_id = get_catalog_id(&doc).unwrap();
        if let Ok(Object::Dictionary(catalog)) = doc.get_object_mut(catalog_id) {
            catalog.set("Metadata", xmp);
        }

        let result = clean_xmp_metadata(&mut doc);
        assert_eq!(result.items_removed, 2);
        assert!(doc.get_object(xmp).is_err());
    }
}

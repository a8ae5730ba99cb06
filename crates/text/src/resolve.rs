//! Span resolver: turns PII detections into page regions.
//!
//! Every occurrence of a value is redacted, not only the first one. Regions
//! from different instances may overlap; merging happens at redaction time so
//! resolution stays side-effect free.

use crate::index::{IndexOptions, PageIndexes, TextOccurrence};
use crate::normalize::normalize;
use blackout_core::{mask_snippet, PiiInstance, RedactionRegion};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverOptions {
    /// Values shorter than this (in normalized characters) are skipped.
    pub min_chars: usize,
    /// Margin in points added around every matched rectangle.
    pub margin: f32,
    pub index: IndexOptions,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            min_chars: 2,
            margin: 1.0,
            index: IndexOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceOutcome {
    Resolved(Vec<TextOccurrence>),
    TooShort,
    Unresolved,
}

/// A value located on a page; kept so the output can be re-checked later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedValue {
    pub page: usize,
    pub value: String,
    pub category: String,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub regions: Vec<RedactionRegion>,
    pub resolved: Vec<ResolvedValue>,
    pub warnings: Vec<String>,
    pub resolved_count: usize,
    pub unresolved_count: usize,
    pub skipped_count: usize,
}

pub struct SpanResolver<'a, 'd> {
    indexes: &'a PageIndexes<'d>,
    options: &'a ResolverOptions,
}

impl<'a, 'd> SpanResolver<'a, 'd> {
    pub fn new(indexes: &'a PageIndexes<'d>, options: &'a ResolverOptions) -> Self {
        Self { indexes, options }
    }

    /// Pages to search, first page first. Out-of-range page hints are ignored.
    pub fn candidate_pages(&self, instance: &PiiInstance) -> Vec<usize> {
        let count = self.indexes.page_count();
        match &instance.pages {
            Some(pages) => {
                let mut pages: Vec<usize> = pages.iter().copied().filter(|p| *p < count).collect();
                pages.sort_unstable();
                pages.dedup();
                pages
            }
            None => (0..count).collect(),
        }
    }

    pub fn resolve(&self, instance: &PiiInstance) -> InstanceOutcome {
        let needle = normalize(&instance.value);
        if needle.chars().count() < self.options.min_chars {
            return InstanceOutcome::TooShort;
        }

        let occurrences: Vec<TextOccurrence> = self
            .candidate_pages(instance)
            .into_iter()
            .filter_map(|page| self.indexes.get(page))
            .flat_map(|index| index.find(&needle))
            .collect();

        if occurrences.is_empty() {
            InstanceOutcome::Unresolved
        } else {
            InstanceOutcome::Resolved(occurrences)
        }
    }

    /// Resolves every instance. Identical occurrences reported by several
    /// instances produce regions only once.
    pub fn resolve_all(&self, instances: &[PiiInstance]) -> Resolution {
        let mut resolution = Resolution::default();
        let mut seen: HashSet<(usize, usize, usize)> = HashSet::new();
        let mut seen_values: HashSet<ResolvedValue> = HashSet::new();

        for instance in instances {
            match self.resolve(instance) {
                InstanceOutcome::TooShort => {
                    resolution.skipped_count += 1;
                    resolution.warnings.push(format!(
                        "skipped PII shorter than {} chars ({}: {})",
                        self.options.min_chars,
                        instance.category,
                        mask_snippet(&instance.value)
                    ));
                }
                InstanceOutcome::Unresolved => {
                    resolution.unresolved_count += 1;
                    let scope = match &instance.pages {
                        Some(pages) => format!("pages {:?}", pages),
                        None => "any page".to_string(),
                    };
                    log::debug!(
                        "[Resolve] no occurrence of {} ({}) on {}",
                        mask_snippet(&instance.value),
                        instance.category,
                        scope
                    );
                    resolution.warnings.push(format!(
                        "unresolved PII ({}: {}): no matching text on {}",
                        instance.category,
                        mask_snippet(&instance.value),
                        scope
                    ));
                }
                InstanceOutcome::Resolved(occurrences) => {
                    resolution.resolved_count += 1;
                    for occurrence in occurrences {
                        let key = (occurrence.page, occurrence.start, occurrence.text.len());
                        if !seen.insert(key) {
                            continue;
                        }
                        for fragment in &occurrence.fragments {
                            resolution.regions.push(RedactionRegion {
                                page: occurrence.page,
                                rect: fragment.expand(self.options.margin),
                                category: instance.category.clone(),
                                start: occurrence.start,
                            });
                        }
                        let value = ResolvedValue {
                            page: occurrence.page,
                            value: occurrence.text,
                            category: instance.category.clone(),
                        };
                        if seen_values.insert(value.clone()) {
                            resolution.resolved.push(value);
                        }
                    }
                }
            }
        }

        log::info!(
            "[Resolve] {} instances: {} resolved, {} unresolved, {} skipped, {} regions",
            instances.len(),
            resolution.resolved_count,
            resolution.unresolved_count,
            resolution.skipped_count,
            resolution.regions.len()
        );
        log::debug!(
            "[Resolve] {} of {} page indexes built",
            self.indexes.built(),
            self.indexes.page_count()
        );
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackout_core::{Document, PageText, Rect, SourceKey, TextToken};

    fn tok(text: &str, x: f32, y: f32) -> TextToken {
        let width = text.chars().count() as f32 * 6.0;
        TextToken::new(text, Rect::new(x, y, x + width, y + 12.0))
    }

    fn form_page() -> PageText {
        PageText::with_tokens(
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

    fn document() -> Document {
        Document::new(
            SourceKey::new("in", "form.pdf"),
            Vec::new(),
            vec![
                form_page(),
                PageText::with_tokens(
                    "Contact John Smith",
                    vec![
                        tok("Contact", 72.0, 700.0),
                        tok("John", 120.0, 700.0),
                        tok("Smith", 150.0, 700.0),
                    ],
                ),
                PageText::image_only(),
            ],
        )
    }

    #[test]
    fn test_name_and_ssn_scenario() {
        let doc = Document::new(SourceKey::new("in", "one.pdf"), Vec::new(), vec![form_page()]);
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution = resolver.resolve_all(&[
            PiiInstance::new("John Smith", "NAME"),
            PiiInstance::new("123-45-6789", "SSN"),
        ]);
        assert_eq!(resolution.regions.len(), 2);
        assert_eq!(resolution.resolved_count, 2);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_all_occurrences_across_pages() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution = resolver.resolve_all(&[PiiInstance::new("john smith", "NAME")]);
        assert_eq!(resolution.regions.len(), 2);
        assert_eq!(resolution.regions[0].page, 0);
        assert_eq!(resolution.regions[1].page, 1);
        assert_eq!(resolution.resolved.len(), 2);
    }

    #[test]
    fn test_regions_carry_margin() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions {
            margin: 2.0,
            ..ResolverOptions::default()
        };
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution =
            resolver.resolve_all(&[PiiInstance::new("123-45-6789", "SSN").on_pages(vec![0])]);
        assert_eq!(resolution.regions.len(), 1);
        let rect = resolution.regions[0].rect;
        assert_eq!(rect.x0, 208.0);
        assert_eq!(rect.y0, 698.0);
        assert_eq!(rect.y1, 714.0);
    }

    #[test]
    fn test_page_scope_limits_search() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution =
            resolver.resolve_all(&[PiiInstance::new("John Smith", "NAME").on_pages(vec![1, 9])]);
        assert_eq!(resolution.regions.len(), 1);
        assert_eq!(resolution.regions[0].page, 1);
        assert_eq!(indexes.built(), 1);
    }

    #[test]
    fn test_absent_value_is_a_warning_not_an_error() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution = resolver.resolve_all(&[PiiInstance::new("Jane Doe", "NAME")]);
        assert!(resolution.regions.is_empty());
        assert_eq!(resolution.unresolved_count, 1);
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].starts_with("unresolved PII (NAME"));
        assert!(!resolution.warnings[0].contains("Jane Doe"));
    }

    #[test]
    fn test_short_values_are_skipped() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        assert_eq!(
            resolver.resolve(&PiiInstance::new(" J ", "INITIAL")),
            InstanceOutcome::TooShort
        );
        let resolution = resolver.resolve_all(&[PiiInstance::new("S", "INITIAL")]);
        assert_eq!(resolution.skipped_count, 1);
        assert!(resolution.regions.is_empty());
        assert_eq!(indexes.built(), 0);
    }

    #[test]
    fn test_duplicate_instances_do_not_duplicate_regions() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution = resolver.resolve_all(&[
            PiiInstance::new("123-45-6789", "SSN"),
            PiiInstance::new("123-45-6789", "ACCOUNT_NUMBER"),
        ]);
        assert_eq!(resolution.resolved_count, 2);
        assert_eq!(resolution.regions.len(), 1);
    }

    #[test]
    fn test_overlapping_instances_keep_both_regions() {
        let doc = document();
        let indexes = PageIndexes::new(&doc, IndexOptions::default());
        let options = ResolverOptions::default();
        let resolver = SpanResolver::new(&indexes, &options);

        let resolution = resolver.resolve_all(&[
            PiiInstance::new("John Smith", "NAME").on_pages(vec![0]),
            PiiInstance::new("John", "FIRST_NAME").on_pages(vec![0]),
        ]);
        assert_eq!(resolution.regions.len(), 2);
        assert!(resolution.regions[0].rect.intersects(&resolution.regions[1].rect));
    }
}

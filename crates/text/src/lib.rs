//! Geometry indexing and PII span resolution over positioned page text.

pub mod index;
pub mod normalize;
pub mod resolve;

pub use index::{GeometryIndex, HyphenPolicy, IndexOptions, PageIndexes, TextOccurrence};
pub use normalize::normalize;
pub use resolve::{InstanceOutcome, Resolution, ResolvedValue, ResolverOptions, SpanResolver};

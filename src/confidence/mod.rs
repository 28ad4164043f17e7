//! Confidence scoring and verdict labeling.

mod merger;

pub use merger::{DynamicEvidence, MergedTag, Merger, Score};

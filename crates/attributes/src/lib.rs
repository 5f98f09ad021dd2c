//! Attribute scoring for generated reframes.
//!
//! `specificity` is embedding-based; `actionability`, `empathy` and
//! `positivity` are capped keyword counters (see [`lexicon`]).

pub mod lexicon;
mod scorer;

pub use scorer::AttributeScorer;

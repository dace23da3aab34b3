// Pipeline processing: normalization, matching, merging, and coordinate harmonization

pub mod catalog;
pub mod harmonize;
pub mod matching;
pub mod normalize;

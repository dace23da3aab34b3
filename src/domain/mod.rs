//! Core marker types. Pure data and invariants, no I/O.

mod build;
mod extract;
mod lifecycle;
mod marker;

pub use build::Build;
pub use extract::{chronological_key, compare_versions, MarkerExtract};
pub use lifecycle::ExtractState;
pub use marker::{
    CanonicalMarker, MatchStrategyKind, PositionOrigin, ProvenanceEntry, StoredPosition,
};

/// One archive version's extracts, in feed order
#[derive(Debug, Clone, Default)]
pub struct VersionBatch {
    pub version: String,
    pub extracts: Vec<MarkerExtract>,
    /// Lines the feed could not decode at all
    pub unreadable_lines: usize,
}

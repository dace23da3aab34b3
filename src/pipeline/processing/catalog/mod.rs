//! Field-level merge of extracts into canonical records, with provenance.

pub mod idempotency;
pub mod merge;
pub mod provenance;

pub use idempotency::IdempotencyChecker;
pub use merge::{MergeEngine, MergeOutcome};

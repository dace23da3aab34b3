use tracing::debug;

use super::idempotency::IdempotencyChecker;
use super::provenance::{alias_candidates, alias_delta, entry_for};
use crate::domain::{Build, CanonicalMarker, MarkerExtract, MatchStrategyKind};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{parse_haplogroup_label, HaplogroupLabel};
use crate::pipeline::storage::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new record was registered from the extract
    Created,
    /// The extract was folded into an existing record
    Merged,
    /// The extract was already reflected on the record
    Unchanged,
}

/// The only writer of the registry.
///
/// Extracts must be applied in ascending version order: haplogroup and mutation are
/// last-write-wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fold `extract` into the record `canonical_id`, creating it if it does not exist.
    /// `matched_by` is the cascade strategy that resolved the id, `None` for a creation.
    pub fn apply(
        &self,
        extract: &MarkerExtract,
        canonical_id: &str,
        registry: &mut Registry,
        matched_by: Option<MatchStrategyKind>,
    ) -> Result<MergeOutcome> {
        let label = parse_haplogroup_label(&extract.haplogroup);

        if !registry.contains(canonical_id) {
            let record = Self::create(extract, canonical_id, &label);
            registry.insert(record)?;
            metrics::merge::record_created();
            debug!("Created {} from {} ({})", canonical_id, extract.name, extract.version);
            return Ok(MergeOutcome::Created);
        }

        let outcome = registry.update(canonical_id, |record| {
            if IdempotencyChecker::already_applied(record, extract, &label) {
                return MergeOutcome::Unchanged;
            }
            Self::merge_into(record, extract, &label, matched_by);
            MergeOutcome::Merged
        });

        match outcome {
            Some(MergeOutcome::Unchanged) => {
                metrics::merge::merge_skipped();
                debug!("{} ({}) already merged into {}", extract.name, extract.version, canonical_id);
                Ok(MergeOutcome::Unchanged)
            }
            Some(outcome) => {
                metrics::merge::extract_merged();
                Ok(outcome)
            }
            None => Ok(MergeOutcome::Unchanged),
        }
    }

    /// Commit a harmonizer-derived coordinate. Never replaces a direct position.
    pub fn commit_derived(
        &self,
        registry: &mut Registry,
        canonical_id: &str,
        build: Build,
        value: u64,
    ) -> bool {
        let changed = registry
            .update(canonical_id, |record| record.record_derived(build, value))
            .unwrap_or(false);
        if changed {
            metrics::merge::derived_committed(build);
        }
        changed
    }

    fn create(extract: &MarkerExtract, canonical_id: &str, label: &HaplogroupLabel) -> CanonicalMarker {
        let mut record = CanonicalMarker::new(canonical_id, true);
        Self::merge_into(&mut record, extract, label, None);
        record
    }

    fn merge_into(
        record: &mut CanonicalMarker,
        extract: &MarkerExtract,
        label: &HaplogroupLabel,
        matched_by: Option<MatchStrategyKind>,
    ) {
        let candidates = alias_candidates(&record.canonical_id, &extract.name, &extract.aliases);
        let delta = alias_delta(record, &candidates);
        record.aliases.extend(delta.iter().cloned());

        if !label.haplogroup.is_empty() {
            record.haplogroup = label.haplogroup.clone();
        }
        if let Some(status) = &label.status {
            record.status_tags.insert(status.clone());
        }
        if record.reference_id.is_none() {
            record.reference_id = extract.reference_id.clone();
        }
        if extract.mutation.is_some() {
            record.mutation = extract.mutation.clone();
        }
        for (build, value) in &extract.positions {
            record.record_direct(*build, *value);
        }

        record
            .provenance
            .push(entry_for(&extract.version, label, delta, matched_by));
    }
}

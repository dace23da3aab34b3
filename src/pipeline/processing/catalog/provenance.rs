use std::collections::BTreeSet;

use crate::domain::{CanonicalMarker, MatchStrategyKind, ProvenanceEntry};
use crate::pipeline::processing::normalize::HaplogroupLabel;

/// Names an extract contributes to a record's alias set: its own name and its aliases,
/// except the record's `canonical_id`.
pub fn alias_candidates<'a>(
    canonical_id: &str,
    name: &'a str,
    aliases: &'a [String],
) -> BTreeSet<&'a str> {
    std::iter::once(name)
        .chain(aliases.iter().map(String::as_str))
        .filter(|alias| !alias.is_empty() && *alias != canonical_id)
        .collect()
}

/// Candidates not yet present on `record`, sorted
pub fn alias_delta(record: &CanonicalMarker, candidates: &BTreeSet<&str>) -> Vec<String> {
    candidates
        .iter()
        .filter(|alias| !record.aliases.contains(**alias))
        .map(|alias| alias.to_string())
        .collect()
}

pub fn entry_for(
    version: &str,
    label: &HaplogroupLabel,
    alias_delta: Vec<String>,
    matched_by: Option<MatchStrategyKind>,
) -> ProvenanceEntry {
    ProvenanceEntry {
        version: version.to_string(),
        haplogroup: label.haplogroup.clone(),
        status: label.status.clone(),
        alias_delta,
        matched_by,
    }
}

use crate::domain::{CanonicalMarker, MarkerExtract};
use crate::pipeline::processing::normalize::HaplogroupLabel;

use super::provenance::alias_candidates;

/// Detects extracts that have already been merged into a record
pub struct IdempotencyChecker;

impl IdempotencyChecker {
    /// True when merging `extract` into `record` would change nothing: the last
    /// provenance entry is this version's snapshot and every field the extract carries is
    /// already reflected on the record.
    pub fn already_applied(
        record: &CanonicalMarker,
        extract: &MarkerExtract,
        label: &HaplogroupLabel,
    ) -> bool {
        let Some(last) = record.provenance.last() else {
            return false;
        };

        last.version == extract.version
            && last.haplogroup == label.haplogroup
            && last.status == label.status
            && alias_candidates(&record.canonical_id, &extract.name, &extract.aliases)
                .iter()
                .all(|alias| record.aliases.contains(*alias))
            && extract
                .positions
                .iter()
                .all(|(build, value)| record.direct_position(*build) == Some(*value))
            && (extract.reference_id.is_none() || record.reference_id.is_some())
            && (extract.mutation.is_none() || extract.mutation == record.mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Build, ProvenanceEntry};
    use crate::pipeline::processing::normalize::parse_haplogroup_label;

    fn merged_record() -> CanonicalMarker {
        let mut record = CanonicalMarker::new("M269", true);
        record.haplogroup = "R1b1a2".to_string();
        record.aliases.insert("S3".to_string());
        record.record_direct(Build::B37, 22_739_367);
        record.provenance.push(ProvenanceEntry {
            version: "2013".to_string(),
            haplogroup: "R1b1a2".to_string(),
            status: None,
            alias_delta: vec!["S3".to_string()],
            matched_by: None,
        });
        record
    }

    #[test]
    fn test_same_snapshot_is_already_applied() {
        let extract = MarkerExtract::new("M269", "2013")
            .with_haplogroup("R1b1a2")
            .with_alias("S3")
            .with_position(Build::B37, 22_739_367);
        let label = parse_haplogroup_label(&extract.haplogroup);
        assert!(IdempotencyChecker::already_applied(&merged_record(), &extract, &label));
    }

    #[test]
    fn test_new_alias_or_version_is_not_applied() {
        let extract = MarkerExtract::new("M269", "2013")
            .with_haplogroup("R1b1a2")
            .with_alias("PF6517");
        let label = parse_haplogroup_label(&extract.haplogroup);
        assert!(!IdempotencyChecker::already_applied(&merged_record(), &extract, &label));

        let extract = MarkerExtract::new("M269", "2014").with_haplogroup("R1b1a2");
        let label = parse_haplogroup_label(&extract.haplogroup);
        assert!(!IdempotencyChecker::already_applied(&merged_record(), &extract, &label));
    }
}
